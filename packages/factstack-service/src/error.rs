pub type Result<T, E = Error> = std::result::Result<T, E>;

pub type BackendResult<T> = std::result::Result<T, BackendError>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Retrieval unavailable: {message}")]
	RetrievalUnavailable { message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
}
impl From<factstack_storage::Error> for Error {
	fn from(err: factstack_storage::Error) -> Self {
		Self::Storage { message: err.to_string() }
	}
}

/// Failure of a single collaborator call. Never fatal on its own.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
	#[error("Backend unavailable: {message}")]
	Unavailable { message: String },
	#[error("Backend timed out after {timeout_ms} ms.")]
	Timeout { timeout_ms: u64 },
	#[error("Backend failed: {message}")]
	Failed { message: String },
}
impl From<factstack_storage::Error> for BackendError {
	fn from(err: factstack_storage::Error) -> Self {
		Self::Failed { message: err.to_string() }
	}
}
