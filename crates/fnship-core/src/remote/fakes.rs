//! In-memory fake for the function service (testing only)
//!
//! Records every call so tests can assert ordering and payloads without a
//! platform account, and supports failure injection for the error paths.

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{CodeUpdate, FunctionService, InvocationMode, InvokeOutcome, RemoteError, RemoteResult};
use crate::digest::ArchiveDigest;

/// Recorded `update_code` call.
#[derive(Debug, Clone)]
pub struct RecordedUpdate {
    pub function: String,
    pub archive_bytes: usize,
    pub archive_digest: ArchiveDigest,
}

/// Recorded `invoke` call.
#[derive(Debug, Clone)]
pub struct RecordedInvoke {
    pub function: String,
    pub mode: InvocationMode,
    pub payload: Vec<u8>,
}

/// In-memory [`FunctionService`] fake.
#[derive(Debug, Default)]
pub struct MemoryFunctionService {
    updates: Mutex<Vec<RecordedUpdate>>,
    invokes: Mutex<Vec<RecordedInvoke>>,
    fail_update: bool,
    fail_invoke: bool,
}

impl MemoryFunctionService {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fake whose `update_code` always fails.
    pub fn failing_updates() -> Self {
        Self {
            fail_update: true,
            ..Self::default()
        }
    }

    /// A fake whose `invoke` always fails.
    pub fn failing_invokes() -> Self {
        Self {
            fail_invoke: true,
            ..Self::default()
        }
    }

    /// Snapshot of recorded code updates.
    pub fn updates(&self) -> Vec<RecordedUpdate> {
        self.updates.lock().unwrap().clone()
    }

    /// Snapshot of recorded invocations.
    pub fn invokes(&self) -> Vec<RecordedInvoke> {
        self.invokes.lock().unwrap().clone()
    }
}

#[async_trait]
impl FunctionService for MemoryFunctionService {
    async fn update_code(&self, function: &str, archive: &Path) -> RemoteResult<CodeUpdate> {
        if self.fail_update {
            return Err(RemoteError::UpdateFailed(
                "injected update failure".to_string(),
            ));
        }

        // Read the archive eagerly: the contract requires it to exist and be
        // non-empty at upload time.
        let bytes = std::fs::read(archive)?;
        if bytes.is_empty() {
            return Err(RemoteError::UpdateFailed("empty archive".to_string()));
        }

        let digest = ArchiveDigest::from_bytes(&bytes);
        self.updates.lock().unwrap().push(RecordedUpdate {
            function: function.to_string(),
            archive_bytes: bytes.len(),
            archive_digest: digest.clone(),
        });

        Ok(CodeUpdate {
            function: function.to_string(),
            code_sha256: Some(digest.as_str().to_string()),
            code_size: Some(bytes.len() as u64),
        })
    }

    async fn invoke(
        &self,
        function: &str,
        mode: InvocationMode,
        payload: &[u8],
        output: &Path,
    ) -> RemoteResult<InvokeOutcome> {
        if self.fail_invoke {
            return Err(RemoteError::InvokeFailed(
                "injected invoke failure".to_string(),
            ));
        }

        self.invokes.lock().unwrap().push(RecordedInvoke {
            function: function.to_string(),
            mode,
            payload: payload.to_vec(),
        });

        // Mirror the real client: the response body lands in the output file.
        std::fs::write(output, b"{}")?;

        Ok(InvokeOutcome {
            status_code: mode.expected_status(),
            function_error: None,
            output_path: output.to_path_buf(),
        })
    }
}
