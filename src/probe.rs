use std::io::Write;
use std::time::Instant;

use crate::config::AppConfig;
use crate::diagnostics::{OutputFormat, ProbeOutcome, ProbeReport, TableReport};
use crate::error::ProbeError;
use crate::network::RestClient;
use crate::security::inspect_key;
use crate::utils::unix_millis;

/// One-shot connectivity check: build a client, read at most `limit` rows
/// from each configured table, report what happened.
pub struct Probe {
    config: AppConfig,
}

impl Probe {
    pub fn new(config: AppConfig) -> Self {
        Probe { config }
    }

    /// Run the probe. Failures are captured in the report, never returned.
    pub async fn run(&self) -> ProbeReport {
        let started = Instant::now();
        let timestamp = unix_millis();
        let limit = self.config.probe.limit;

        let client = match self.connect() {
            Ok(client) => client,
            Err(e) => {
                tracing::warn!(kind = e.kind(), "handshake failed: {}", e);
                let elapsed_ms = started.elapsed().as_millis();
                return ProbeReport::failed(timestamp, self.host(), Some(limit), elapsed_ms, &e);
            }
        };

        let mut tables = Vec::with_capacity(self.config.probe.tables.len());
        for table in &self.config.probe.tables {
            tables.push(self.read_table(&client, table).await);
        }

        let elapsed_ms = started.elapsed().as_millis();
        let report = ProbeReport::from_tables(timestamp, self.host(), limit, elapsed_ms, tables);
        match (report.records(), &report.outcome) {
            (Some(records), _) => {
                tracing::info!(records, elapsed_ms, "handshake succeeded")
            }
            (None, ProbeOutcome::Failure { kind, message }) => {
                tracing::warn!(kind = %kind, elapsed_ms, "handshake failed: {}", message)
            }
            (None, ProbeOutcome::Success { .. }) => {}
        }
        report
    }

    fn connect(&self) -> Result<RestClient, ProbeError> {
        let creds = self.config.credentials()?;
        inspect_key(creds.key());
        tracing::debug!(?creds, tables = ?self.config.probe.tables, "connecting");
        RestClient::new(&creds, self.config.probe.timeout())
    }

    async fn read_table(&self, client: &RestClient, table: &str) -> TableReport {
        let started = Instant::now();
        let result = client
            .from(table)
            .select("*")
            .limit(self.config.probe.limit)
            .execute()
            .await;

        let outcome = match result {
            Ok(rows) => {
                tracing::debug!(
                    table,
                    status = rows.status,
                    records = rows.count(),
                    "read ok"
                );
                ProbeOutcome::Success {
                    records: rows.count(),
                }
            }
            Err(e) => {
                tracing::debug!(table, kind = e.kind(), "read failed: {}", e);
                ProbeOutcome::failure(&e)
            }
        };

        TableReport {
            table: table.to_string(),
            elapsed_ms: started.elapsed().as_millis(),
            outcome,
        }
    }

    fn host(&self) -> Option<String> {
        let url = self.config.connection.url.as_deref()?;
        reqwest::Url::parse(url.trim())
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
    }
}

/// Run the probe and print the outcome to `out`.
pub async fn test_connection(
    config: AppConfig,
    format: OutputFormat,
    out: &mut dyn Write,
) -> ProbeReport {
    let report = Probe::new(config).run().await;
    emit(&report, format, out);
    report
}

/// Report a configuration that could not be loaded, in the requested format.
pub fn report_load_failure(
    err: &anyhow::Error,
    format: OutputFormat,
    out: &mut dyn Write,
) -> ProbeReport {
    let err = ProbeError::Config(format!("{:#}", err));
    let report = ProbeReport::failed(unix_millis(), None, None, 0, &err);
    emit(&report, format, out);
    report
}

fn emit(report: &ProbeReport, format: OutputFormat, out: &mut dyn Write) {
    if let Err(e) = report.emit(format, out) {
        tracing::error!("failed to write probe result: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::{FAILURE_PREFIX, SUCCESS_LINE};
    use mockito::Matcher;

    fn config_for(url: &str, key: &str) -> AppConfig {
        let mut cfg = AppConfig::load_default().unwrap();
        cfg.connection.url = Some(url.to_string());
        cfg.connection.key = Some(key.to_string());
        cfg.probe.timeout_secs = 5;
        cfg
    }

    async fn run_human(cfg: AppConfig) -> (ProbeReport, String) {
        let mut buf = Vec::new();
        let report = test_connection(cfg, OutputFormat::Human, &mut buf).await;
        (report, String::from_utf8(buf).unwrap())
    }

    #[tokio::test]
    async fn test_empty_table_reports_zero_records() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/rest/v1/appointments")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("select".into(), "*".into()),
                Matcher::UrlEncoded("limit".into(), "1".into()),
            ]))
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let (report, text) = run_human(config_for(&server.url(), "anon-key")).await;
        mock.assert_async().await;
        assert!(report.is_success());
        assert_eq!(report.records(), Some(0));
        assert_eq!(report.exit_code(), 0);
        assert_eq!(
            text,
            format!(
                "{}\nData response status: 0 records found (expected 0).\n",
                SUCCESS_LINE
            )
        );
    }

    #[tokio::test]
    async fn test_populated_table_reports_one_record() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/rest/v1/appointments")
            .match_query(Matcher::UrlEncoded("limit".into(), "1".into()))
            .with_status(200)
            .with_body(r#"[{"id":"a1","status":"pending"}]"#)
            .create_async()
            .await;

        let (report, text) = run_human(config_for(&server.url(), "anon-key")).await;
        assert_eq!(report.records(), Some(1));
        assert!(text.contains("1 records found"));
    }

    #[tokio::test]
    async fn test_rejected_key_prints_failure() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/rest/v1/appointments")
            .match_query(Matcher::Any)
            .with_status(401)
            .with_body(r#"{"message":"Invalid API key"}"#)
            .create_async()
            .await;

        let (report, text) = run_human(config_for(&server.url(), "wrong-key")).await;
        assert!(!report.is_success());
        assert_eq!(report.exit_code(), 1);
        assert!(text.starts_with(FAILURE_PREFIX));
        assert!(text.trim_end().len() > FAILURE_PREFIX.len());
        assert!(text.contains("Invalid API key"));
    }

    #[tokio::test]
    async fn test_missing_table_prints_failure() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/rest/v1/no_such_table")
            .match_query(Matcher::Any)
            .with_status(404)
            .with_body(
                r#"{"code":"PGRST205","message":"Could not find the table 'public.no_such_table' in the schema cache"}"#,
            )
            .create_async()
            .await;

        let mut cfg = config_for(&server.url(), "anon-key");
        cfg.probe.tables = vec!["no_such_table".into()];
        let (report, text) = run_human(cfg).await;
        assert!(
            matches!(&report.outcome, ProbeOutcome::Failure { kind, .. } if kind == "not_found")
        );
        assert!(text.starts_with(FAILURE_PREFIX));
    }

    #[tokio::test]
    async fn test_each_table_is_read_once() {
        let mut server = mockito::Server::new_async().await;
        let mut mocks = Vec::new();
        for (table, body) in [
            ("appointments", "[]"),
            ("refills", r#"[{"id":1}]"#),
            ("contact_messages", "[]"),
        ] {
            let mock = server
                .mock("GET", format!("/rest/v1/{}", table).as_str())
                .match_query(Matcher::UrlEncoded("limit".into(), "1".into()))
                .with_status(200)
                .with_body(body)
                .expect(1)
                .create_async()
                .await;
            mocks.push(mock);
        }

        let mut cfg = config_for(&server.url(), "anon-key");
        cfg.probe.tables = vec![
            "appointments".into(),
            "refills".into(),
            "contact_messages".into(),
        ];
        let (report, text) = run_human(cfg).await;
        for mock in &mocks {
            mock.assert_async().await;
        }

        assert!(report.is_success());
        assert_eq!(report.records(), Some(1));
        assert_eq!(report.tables.len(), 3);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], SUCCESS_LINE);
        assert_eq!(lines[2], "Data response status: 1 records found in refills.");
    }

    #[tokio::test]
    async fn test_one_missing_table_among_several() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/rest/v1/appointments")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;
        server
            .mock("GET", "/rest/v1/transfers")
            .match_query(Matcher::Any)
            .with_status(404)
            .with_body(
                r#"{"code":"PGRST205","message":"Could not find the table 'public.transfers'"}"#,
            )
            .create_async()
            .await;

        let mut cfg = config_for(&server.url(), "anon-key");
        cfg.probe.tables = vec!["appointments".into(), "transfers".into()];
        let (report, text) = run_human(cfg).await;

        assert_eq!(report.exit_code(), 1);
        assert!(report.tables[0].outcome.is_success());
        assert!(!report.tables[1].outcome.is_success());
        assert!(text.starts_with("❌ Handshake Failed: 1 of 2 tables failed\n"));
        assert!(text.contains("Query failed for transfers: "));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_prints_failure() {
        let (report, text) = run_human(config_for("http://127.0.0.1:1", "anon-key")).await;
        assert!(
            matches!(&report.outcome, ProbeOutcome::Failure { kind, .. } if kind == "connection")
        );
        assert!(text.starts_with(FAILURE_PREFIX));
    }

    #[tokio::test]
    async fn test_missing_credentials_prints_failure() {
        let cfg = AppConfig::load_default().unwrap();
        let (report, text) = run_human(cfg).await;
        assert!(report.host.is_none());
        assert!(report.tables.is_empty());
        assert!(matches!(&report.outcome, ProbeOutcome::Failure { kind, .. } if kind == "config"));
        assert!(text.contains("url is required"));
    }

    #[tokio::test]
    async fn test_repeated_runs_agree() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/rest/v1/appointments")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("[]")
            .expect(2)
            .create_async()
            .await;

        let probe = Probe::new(config_for(&server.url(), "anon-key"));
        let first = probe.run().await;
        let second = probe.run().await;
        assert_eq!(first.outcome, second.outcome);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_json_output() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/rest/v1/appointments")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let mut buf = Vec::new();
        let cfg = config_for(&server.url(), "anon-key");
        let report = test_connection(cfg, OutputFormat::Json, &mut buf).await;
        assert!(report.is_success());
        let v: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(v["status"], "success");
        assert_eq!(v["records"], 0);
        assert_eq!(v["host"], "127.0.0.1");
        assert_eq!(v["tables"][0]["table"], "appointments");
    }

    #[test]
    fn test_unreadable_config_file_as_json() {
        let err = AppConfig::load_from("/nonexistent/handshake.toml").unwrap_err();

        let mut buf = Vec::new();
        let report = report_load_failure(&err, OutputFormat::Json, &mut buf);
        assert_eq!(report.exit_code(), 1);

        let v: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(v["status"], "failure");
        assert_eq!(v["kind"], "config");
        assert!(v["message"]
            .as_str()
            .unwrap()
            .contains("failed to read config file"));
        assert!(v["tables"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_unreadable_config_file_as_text() {
        let err = AppConfig::load_from("/nonexistent/handshake.toml").unwrap_err();

        let mut buf = Vec::new();
        report_load_failure(&err, OutputFormat::Human, &mut buf);
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with(FAILURE_PREFIX));
        assert_eq!(text.lines().count(), 1);
    }
}
