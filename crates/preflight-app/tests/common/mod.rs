//! Shared fixtures for app integration tests.

use std::sync::{Arc, Mutex};

use preflight_analyzers::Utf8TextExtractor;
use preflight_audit::UploadedFile;
use preflight_core::AuditConfig;
use preflight_llm::{ChatRequest, ChatTransport, LlmClient, LlmError};
use preflight_app::Services;

/// SOW fixture with explicit scope sections.
#[allow(dead_code)]
pub const SOW: &str = "Statement of Work\n\
1. Overview\n\
2. In Scope\n\
- Customer portal with login\n\
- PDF invoice export\n\
3. Out of Scope\n\
- CSV export of any report\n\
- Slack integration\n\
4. Timeline\n";

/// Transport that replays a scripted sequence, erroring once drained.
#[allow(dead_code)]
pub struct ScriptedTransport {
    script: Mutex<Vec<Result<String, String>>>,
}

impl ScriptedTransport {
    #[allow(dead_code)]
    pub fn new(script: Vec<Result<String, String>>) -> Self {
        Self {
            script: Mutex::new(script),
        }
    }

    /// Transport with nothing scripted: every call fails.
    #[allow(dead_code)]
    pub fn always_failing() -> Self {
        Self::new(Vec::new())
    }
}

impl ChatTransport for ScriptedTransport {
    fn complete(
        &self,
        _endpoint: &str,
        _model: &str,
        _request: &ChatRequest,
    ) -> Result<String, LlmError> {
        let mut script = self.script.lock().expect("script lock");
        if script.is_empty() {
            return Err(LlmError::Transport("scripted outage".to_string()));
        }
        script.remove(0).map_err(LlmError::Transport)
    }
}

/// Services with the LLM disabled (heuristic-only mode).
#[allow(dead_code)]
pub fn services_without_llm() -> Services {
    Services::new(AuditConfig::default(), Arc::new(Utf8TextExtractor), None)
}

/// Services with a scripted provider transport.
#[allow(dead_code)]
pub fn services_with_script(script: Vec<Result<String, String>>) -> Services {
    let client = LlmClient::new(
        "https://provider.test/v1/chat/completions",
        "test-model",
        Arc::new(ScriptedTransport::new(script)),
    )
    .expect("valid endpoint");
    Services::new(
        AuditConfig::default(),
        Arc::new(Utf8TextExtractor),
        Some(client),
    )
}

/// Clean two-row CSV with rich text cells.
#[allow(dead_code)]
pub fn clean_csv_file() -> UploadedFile {
    UploadedFile::new(
        "clean.csv",
        &b"name,joined,notes\nalice,2023-01-05,lead engineer on the platform\nbob,2023-02-10,site reliability contact\n"[..],
    )
}

/// Text file carrying an SSN and a Luhn-valid card number.
#[allow(dead_code)]
pub fn pii_txt_file() -> UploadedFile {
    UploadedFile::new(
        "dump.txt",
        &b"SSN: 123-45-6789 and card 4242 4242 4242 4242 on file"[..],
    )
}
