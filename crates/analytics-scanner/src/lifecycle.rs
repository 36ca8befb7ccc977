//! Per-target scan lifecycle.
//!
//! env -> metadata -> completeness -> register -> outcome
//!
//! Every step records its own errors into one list and returns a bare
//! `Err(Halt)`; nothing is raised past `run`. On the failure path the
//! collected errors are POSTed to `/api/v1/scanner-error` (best effort, a
//! failure there is appended, never escalated) before the outcome is sealed.

use crate::config::{ScanEnv, ENV_IMAGE_NAME, ENV_SERVER};
use crate::metadata::MetadataProvider;
use crate::net::{AnalyticsApi, ErrorReport, RegistrationError};
use crate::types::{MetadataKey, MetadataRecord, ScanOutcome, ScanTarget, StatusPolicy};
use serde_json::{json, Map, Value};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d-%H-%M-%S-%6f";

pub const NON_OK_STATUS_MSG: &str = "Returned non okay status code on POST request.";

pub const NO_SERVER_FOR_REPORT_MSG: &str =
    "Can't report errors via /scanner-error API, as SERVER URL is not given in scanner command.";

pub fn timestamp() -> String {
    chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
}

fn missing_env_msg(var: &str) -> String {
    format!(
        "No value for {var} env variable. Please re-run with: \
         SERVER=<url> IMAGE_NAME=<image> atomic scan [..]"
    )
}

/// Errors for the step are already recorded when this is returned.
struct Halt;

type Step<T> = std::result::Result<T, Halt>;

pub struct ScanLifecycle<'a> {
    target: &'a ScanTarget,
    env: &'a ScanEnv,
    provider: &'a MetadataProvider,
    api: &'a dyn AnalyticsApi,
    status_policy: StatusPolicy,

    started_at: String,
    server: Option<String>,
    image: Option<String>,
    metadata: MetadataRecord,
    scan_data: Map<String, Value>,
    errors: Vec<String>,
}

impl<'a> ScanLifecycle<'a> {
    pub fn new(
        target: &'a ScanTarget,
        env: &'a ScanEnv,
        provider: &'a MetadataProvider,
        api: &'a dyn AnalyticsApi,
        status_policy: StatusPolicy,
    ) -> Self {
        Self {
            target,
            env,
            provider,
            api,
            status_policy,
            started_at: timestamp(),
            server: None,
            image: None,
            metadata: MetadataRecord::new(),
            scan_data: Map::new(),
            errors: Vec::new(),
        }
    }

    /// Drives the target to `Succeeded` or `Failed`. Always returns an outcome.
    pub fn run(mut self) -> ScanOutcome {
        tracing::info!(target_id = %self.target.id, "scan started");
        match self.drive() {
            Ok(response) => self.finish(Some(response)),
            Err(Halt) => {
                self.report_failure();
                self.finish(None)
            }
        }
    }

    fn drive(&mut self) -> Step<Value> {
        let (image, server) = self.resolve_env()?;
        self.record_image_id(&image);
        self.obtain_metadata(&image)?;
        self.validate(&image)?;
        self.register(&server)
    }

    fn fail(&mut self, msg: impl Into<String>) {
        let msg = msg.into();
        tracing::warn!(target_id = %self.target.id, "{msg}");
        self.errors.push(msg);
    }

    /// Both variables are checked so the report names every missing one.
    fn resolve_env(&mut self) -> Step<(String, String)> {
        self.image = self.target.image.clone();
        self.server = self.env.server.clone();

        if self.image.is_none() {
            self.fail(missing_env_msg(ENV_IMAGE_NAME));
        }
        if self.server.is_none() {
            self.fail(missing_env_msg(ENV_SERVER));
        }
        if let Some(image) = &self.image {
            self.scan_data
                .insert("image_name".into(), Value::String(image.clone()));
        }
        if let Some(server) = &self.server {
            self.scan_data
                .insert("server_url".into(), Value::String(server.clone()));
        }

        match (self.image.clone(), self.server.clone()) {
            (Some(image), Some(server)) => Ok((image, server)),
            _ => Err(Halt),
        }
    }

    fn record_image_id(&mut self, image: &str) {
        match self.provider.image_id(image) {
            Ok(id) => {
                self.scan_data.insert("image_id".into(), Value::String(id));
            }
            Err(e) => tracing::warn!(image, "image ID unavailable: {e}"),
        }
    }

    fn obtain_metadata(&mut self, image: &str) -> Step<()> {
        match self.provider.resolve(image) {
            Ok(record) => {
                self.metadata = record;
                Ok(())
            }
            Err(failure) => {
                self.metadata = failure.partial.clone();
                for msg in failure.messages() {
                    self.fail(msg);
                }
                Err(Halt)
            }
        }
    }

    /// Completeness against the provider's key set. Label resolution already
    /// fails on gaps, so this mostly guards tool output.
    fn validate(&mut self, image: &str) -> Step<()> {
        let missing = self.metadata.missing(self.provider.required_keys());
        for key in &missing {
            self.fail(format!("Metadata for image {image} has no value for {key}."));
        }
        if !missing.is_empty() {
            return Err(Halt);
        }
        self.scan_data.extend(self.metadata.to_json());
        Ok(())
    }

    fn register(&mut self, server: &str) -> Step<Value> {
        match self.api.register(server, &self.metadata) {
            Ok(resp) => Ok(resp),
            Err(RegistrationError::Server { url, status })
                if self.status_policy == StatusPolicy::Lenient =>
            {
                tracing::warn!(%url, status, "non-2xx registration accepted (lenient policy)");
                Ok(json!({ "error": NON_OK_STATUS_MSG, "status": status }))
            }
            Err(e) => {
                self.fail(e.to_string());
                Err(Halt)
            }
        }
    }

    fn report_failure(&mut self) {
        let Some(server) = self.server.clone() else {
            self.errors.push(NO_SERVER_FOR_REPORT_MSG.to_string());
            return;
        };

        let report = ErrorReport {
            image_name: self.image.clone().unwrap_or_default(),
            email_ids: self
                .metadata
                .get(MetadataKey::EmailIds)
                .map(str::to_string),
            error: self.errors.clone(),
        };
        match self.api.report_error(&server, &report) {
            Ok(()) => tracing::info!(target_id = %self.target.id, "reported errors via /scanner-error"),
            Err(e) => self.fail(format!("Could not report errors via /scanner-error API: {e}")),
        }
    }

    fn finish(self, response: Option<Value>) -> ScanOutcome {
        let success = response.is_some() && self.errors.is_empty();
        let outcome = ScanOutcome {
            success,
            errors: self.errors,
            metadata: self.metadata,
            scan_data: self.scan_data,
            response,
            started_at: self.started_at,
            finished_at: timestamp(),
        };
        tracing::info!(
            target_id = %self.target.id,
            success = outcome.success,
            errors = outcome.errors.len(),
            "scan finished"
        );
        outcome
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    use super::*;
    use std::cell::RefCell;

    /// Canned server answers; remembers every call.
    pub struct FakeApi {
        pub register_result: std::result::Result<Value, RegistrationError>,
        pub report_result: std::result::Result<(), RegistrationError>,
        pub registered: RefCell<Vec<(String, MetadataRecord)>>,
        pub reports: RefCell<Vec<(String, ErrorReport)>>,
    }

    impl FakeApi {
        pub fn answering(resp: Value) -> Self {
            Self {
                register_result: Ok(resp),
                report_result: Ok(()),
                registered: RefCell::new(Vec::new()),
                reports: RefCell::new(Vec::new()),
            }
        }

        pub fn failing(err: RegistrationError) -> Self {
            Self {
                register_result: Err(err),
                ..Self::answering(Value::Null)
            }
        }
    }

    impl AnalyticsApi for FakeApi {
        fn register(
            &self,
            server: &str,
            metadata: &MetadataRecord,
        ) -> std::result::Result<Value, RegistrationError> {
            self.registered
                .borrow_mut()
                .push((server.to_string(), metadata.clone()));
            self.register_result.clone()
        }

        fn report_error(
            &self,
            server: &str,
            report: &ErrorReport,
        ) -> std::result::Result<(), RegistrationError> {
            self.reports
                .borrow_mut()
                .push((server.to_string(), report.clone()));
            self.report_result.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fakes::FakeApi;
    use super::*;
    use crate::metadata::fakes::{FakeInspector, FakeRunner};
    use crate::types::{KeySet, MetadataStrategy};

    fn target(env: &ScanEnv) -> ScanTarget {
        ScanTarget::new("0f1e2d", env.image_name.clone())
    }

    fn label_provider(labels: &[(&str, &str)], keys: KeySet) -> MetadataProvider {
        MetadataProvider::new(
            MetadataStrategy::Labels,
            keys,
            Box::new(FakeInspector::with_labels(labels)),
            Box::new(FakeRunner::unused()),
        )
    }

    fn good_labels() -> Vec<(&'static str, &'static str)> {
        vec![("git-url", "https://git.example/repo"), ("git-sha", "abc123")]
    }

    fn env() -> ScanEnv {
        ScanEnv::new("https://example.test", "demo:latest")
    }

    fn run(env: &ScanEnv, provider: &MetadataProvider, api: &FakeApi) -> ScanOutcome {
        let t = target(env);
        ScanLifecycle::new(&t, env, provider, api, StatusPolicy::Strict).run()
    }

    #[test]
    fn first_registration_succeeds() {
        let provider = label_provider(&good_labels(), KeySet::Standard);
        let api = FakeApi::answering(json!({"status": "ok"}));
        let out = run(&env(), &provider, &api);

        assert!(out.success);
        assert!(out.errors.is_empty());
        assert!(out.summary().contains("report will be available"));
        assert_eq!(out.scan_data["image_name"], "demo:latest");
        assert_eq!(out.scan_data["server_url"], "https://example.test");
        assert_eq!(out.scan_data["image_id"], "0123abcd");
        assert_eq!(out.scan_data["git-sha"], "abc123");

        let registered = api.registered.borrow();
        assert_eq!(registered.len(), 1);
        assert_eq!(registered[0].0, "https://example.test");
        assert_eq!(registered[0].1.get(MetadataKey::GitUrl), Some("https://git.example/repo"));
        assert!(api.reports.borrow().is_empty());
    }

    #[test]
    fn repeat_registration_exposes_last_report() {
        let provider = label_provider(&good_labels(), KeySet::Standard);
        let api = FakeApi::answering(json!({"last_scan_report": {"issues": 3}}));
        let out = run(&env(), &provider, &api);

        assert!(out.success);
        assert!(out.summary().contains("report available"));
        assert_eq!(out.results()["last_scan_report"]["issues"], 3);
    }

    #[test]
    fn empty_label_fails_with_one_error_and_reports_it() {
        let provider = label_provider(
            &[("git-url", "https://git.example/repo"), ("git-sha", "")],
            KeySet::Standard,
        );
        let api = FakeApi::answering(json!({}));
        let out = run(&env(), &provider, &api);

        assert!(!out.success);
        assert_eq!(out.errors.len(), 1);
        assert!(out.errors[0].contains("git-sha"));
        assert!(api.registered.borrow().is_empty());

        let reports = api.reports.borrow();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].0, "https://example.test");
        assert_eq!(reports[0].1.image_name, "demo:latest");
        assert_eq!(reports[0].1.error, out.errors);
        assert!(out.summary().starts_with("Error: "));
    }

    #[test]
    fn every_missing_label_is_recorded_in_order() {
        let provider = label_provider(&[], KeySet::WithContact);
        let api = FakeApi::answering(json!({}));
        let out = run(&env(), &provider, &api);

        assert_eq!(out.errors.len(), 3);
        assert!(out.errors[0].contains("git-url"));
        assert!(out.errors[1].contains("git-sha"));
        assert!(out.errors[2].contains("email-ids"));
    }

    #[test]
    fn contact_from_partial_labels_goes_into_error_report() {
        let provider = label_provider(
            &[("git-url", "https://git.example/repo"), ("email-ids", "dev@example.test")],
            KeySet::WithContact,
        );
        let api = FakeApi::answering(json!({}));
        let out = run(&env(), &provider, &api);

        assert!(!out.success);
        assert_eq!(out.metadata.get(MetadataKey::EmailIds), Some("dev@example.test"));
        let reports = api.reports.borrow();
        assert_eq!(reports[0].1.email_ids.as_deref(), Some("dev@example.test"));
    }

    #[test]
    fn missing_server_skips_everything_and_notes_it() {
        let provider = label_provider(&good_labels(), KeySet::Standard);
        let api = FakeApi::answering(json!({}));
        let env = ScanEnv {
            server: None,
            image_name: Some("demo:latest".into()),
        };
        let out = run(&env, &provider, &api);

        assert!(!out.success);
        assert!(out.errors[0].contains("SERVER"));
        assert_eq!(out.errors.last().map(String::as_str), Some(NO_SERVER_FOR_REPORT_MSG));
        assert!(api.registered.borrow().is_empty());
        assert!(api.reports.borrow().is_empty());
        assert_eq!(out.scan_data["image_name"], "demo:latest");
    }

    #[test]
    fn missing_image_is_still_reported_to_server() {
        let provider = label_provider(&good_labels(), KeySet::Standard);
        let api = FakeApi::answering(json!({}));
        let env = ScanEnv {
            server: Some("https://example.test".into()),
            image_name: None,
        };
        let out = run(&env, &provider, &api);

        assert!(!out.success);
        assert_eq!(out.errors.len(), 1);
        assert!(out.errors[0].contains("IMAGE_NAME"));
        let reports = api.reports.borrow();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].1.image_name, "");
    }

    #[test]
    fn both_env_vars_missing_are_both_named() {
        let provider = label_provider(&good_labels(), KeySet::Standard);
        let api = FakeApi::answering(json!({}));
        let out = run(&ScanEnv::default(), &provider, &api);

        assert!(out.errors[0].contains("IMAGE_NAME"));
        assert!(out.errors[1].contains("SERVER"));
        assert!(out.scan_data.is_empty());
    }

    #[test]
    fn server_error_fails_with_status() {
        let provider = label_provider(&good_labels(), KeySet::Standard);
        let api = FakeApi::failing(RegistrationError::Server {
            url: "https://example.test/api/v1/register".into(),
            status: 500,
        });
        let out = run(&env(), &provider, &api);

        assert!(!out.success);
        assert_eq!(out.errors.len(), 1);
        assert!(out.errors[0].contains("500"));
        assert!(out.response.is_none());
        assert_eq!(api.reports.borrow().len(), 1);
    }

    #[test]
    fn lenient_policy_accepts_non_2xx() {
        let provider = label_provider(&good_labels(), KeySet::Standard);
        let api = FakeApi::failing(RegistrationError::Server {
            url: "https://example.test/api/v1/register".into(),
            status: 503,
        });
        let env = env();
        let t = target(&env);
        let out = ScanLifecycle::new(&t, &env, &provider, &api, StatusPolicy::Lenient).run();

        assert!(out.success);
        let resp = out.response.as_ref().unwrap();
        assert_eq!(resp["status"], 503);
        assert_eq!(resp["error"], NON_OK_STATUS_MSG);
    }

    #[test]
    fn transport_failure_and_failed_report_both_recorded() {
        let url = "http://127.0.0.1:9/api/v1/register".to_string();
        let provider = label_provider(&good_labels(), KeySet::Standard);
        let mut api = FakeApi::failing(RegistrationError::Transport {
            url: url.clone(),
            reason: "connection refused".into(),
        });
        api.report_result = Err(RegistrationError::Transport {
            url: "http://127.0.0.1:9/api/v1/scanner-error".into(),
            reason: "connection refused".into(),
        });
        let out = run(&env(), &provider, &api);

        assert!(!out.success);
        assert_eq!(out.errors.len(), 2);
        assert!(out.errors[0].contains(&url));
        assert!(out.errors[1].contains("/api/v1/scanner-error"));
    }

    #[test]
    fn tool_failure_is_single_error() {
        let provider = MetadataProvider::new(
            MetadataStrategy::ExtractionTool,
            KeySet::Standard,
            Box::new(FakeInspector::with_labels(&[])),
            Box::new(FakeRunner::exits(1, "git-url=x\ngit-sha=y\n")),
        );
        let api = FakeApi::answering(json!({}));
        let out = run(&env(), &provider, &api);

        assert!(!out.success);
        assert_eq!(out.errors.len(), 1);
        assert!(out.metadata.is_empty());
    }

    #[test]
    fn tool_mode_registers_without_contact_even_if_requested() {
        let provider = MetadataProvider::new(
            MetadataStrategy::ExtractionTool,
            KeySet::WithContact,
            Box::new(FakeInspector::with_labels(&[])),
            Box::new(FakeRunner::exits(0, "git-url=https://git.example/repo\ngit-sha=abc123\n")),
        );
        let api = FakeApi::answering(json!({"status": "ok"}));
        let out = run(&env(), &provider, &api);

        assert!(out.success, "errors: {:?}", out.errors);
        let registered = api.registered.borrow();
        assert_eq!(registered.len(), 1);
        assert_eq!(registered[0].1.get(MetadataKey::GitSha), Some("abc123"));
        assert_eq!(registered[0].1.get(MetadataKey::EmailIds), None);
    }

    #[test]
    fn image_id_failure_is_not_fatal() {
        let provider = MetadataProvider::new(
            MetadataStrategy::Labels,
            KeySet::Standard,
            Box::new(FakeInspector {
                id: None,
                ..FakeInspector::with_labels(&good_labels())
            }),
            Box::new(FakeRunner::unused()),
        );
        let api = FakeApi::answering(json!({"status": "ok"}));
        let out = run(&env(), &provider, &api);

        assert!(out.success);
        assert!(!out.scan_data.contains_key("image_id"));
    }

    #[test]
    fn timestamps_are_stamped() {
        let provider = label_provider(&good_labels(), KeySet::Standard);
        let api = FakeApi::answering(json!({}));
        let out = run(&env(), &provider, &api);
        assert_eq!(out.started_at.len(), "2026-10-19-12-00-00-000000".len());
        assert!(out.finished_at >= out.started_at);
    }
}
