use crate::snapshot::result_error::{AddDebugObjectAndFnName, AddFunctionName, AddMsg};
use derive_more::Display;
use itertools::Itertools;
use std::fmt::Debug;
use std::path::PathBuf;
use thiserror::Error;
use thiserror_ext::Construct;

#[derive(Error, Debug, Construct)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    WalkDir(#[from] walkdir::Error),
    #[error(transparent)]
    StripPrefix(#[from] std::path::StripPrefixError),
    #[error(transparent)]
    LiblzmaStream(#[from] liblzma::stream::Error),
    #[error(transparent)]
    ValidationError(#[from] validator::ValidationErrors),
    #[error(transparent)]
    SerdeYml(#[from] serde_yml::Error),
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
    #[error(transparent)]
    Persist(#[from] tempfile::PersistError),
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
    #[error("B2 API responded {status} ({code}): {message}")]
    B2Api {
        status: u16,
        code: String,
        message: String,
    },
    #[error("Bucket {0:?} does not exist or is not accessible with this key")]
    BucketNotFound(String),
    #[error("{0:?} is not a directory")]
    NotADirectory(PathBuf),
    #[error("A snapshot job is already running")]
    JobInProgress,
    #[error("Authorization failed:\n{}", indent::indent_all_with("  ", .0.to_string()))]
    Authorization(Box<Error>),
    #[error("Bucket resolution failed:\n{}", indent::indent_all_with("  ", .0.to_string()))]
    BucketResolution(Box<Error>),
    #[error("Upload failed:\n{}", indent::indent_all_with("  ", .0.to_string()))]
    UploadFailure(Box<Error>),
    #[error("{}:\n{}", msg, indent::indent_all_with("  ", error.to_string()))]
    WithMsg { msg: String, error: Box<Error> },
    #[error("{} failed:\n{}", fn_name, indent::indent_all_with("  ", error.to_string()))]
    WithFunctionName { error: Box<Error>, fn_name: String },
    #[error("{:?} {} failed:\n{}", obj_debug, fn_name, indent::indent_all_with("  ", error.to_string()))]
    WithDebugObjAndFnName {
        error: Box<Error>,
        obj_debug: Box<dyn Debug + Send>,
        fn_name: String,
    },
    #[error("{}", itertools::join(.0, "\n\n"))]
    LotsOfError(Vec<Error>),
}

/// Coarse classification of an [`Error`], stable across the context wrappers.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Missing or malformed job configuration, detected before any I/O.
    Validation,
    /// Source folder missing/unreadable or archive/snapshot write failure.
    FileAccess,
    /// Remote credentials rejected or the service unreachable.
    Authorization,
    /// Remote bucket lookup failed.
    BucketResolution,
    /// Transfer of a single archive failed.
    UploadFailure,
    /// Another job is still in flight.
    Busy,
    /// Configuration or credentials file could not be parsed.
    Config,
    Other,
}

impl<S: Into<String>, O: Debug + Send + 'static> AddDebugObjectAndFnName<S, O> for Error {
    fn add_debug_object_and_fn_name(self, obj: O, fn_name: S) -> Self {
        Error::WithDebugObjAndFnName {
            error: Box::new(self),
            obj_debug: Box::new(obj),
            fn_name: fn_name.into(),
        }
    }
}

impl<S: Into<String>> AddFunctionName<S> for Error {
    fn add_fn_name(self, fn_name: S) -> Self {
        Error::WithFunctionName {
            error: Box::new(self),
            fn_name: fn_name.into(),
        }
    }
}

impl<S: Into<String>> AddMsg<S> for Error {
    fn add_msg(self, msg: S) -> Self {
        Self::WithMsg {
            msg: msg.into(),
            error: Box::new(self),
        }
    }
}

impl From<Vec<Error>> for Error {
    fn from(errors: Vec<Error>) -> Self {
        if errors.is_empty() {
            panic!("Should not create lots of errors when error is empty")
        }
        Self::LotsOfError(errors.into_iter().flat_map(Error::into_iter).collect_vec())
    }
}

impl Error {
    pub fn into_iter(self) -> Box<dyn Iterator<Item = Error>> {
        match self {
            Error::LotsOfError(v) => Box::new(v.into_iter().flat_map(Error::into_iter)),
            e => Box::new(std::iter::once(e)),
        }
    }

    pub fn chain(self, other: Error) -> Error {
        Error::LotsOfError(self.into_iter().chain(other.into_iter()).collect_vec())
    }

    /// Classification of the innermost meaningful error.
    ///
    /// Context wrappers are transparent; the remote classes win over whatever
    /// they wrap, so an io error while reading an archive for upload is still an
    /// [`ErrorKind::UploadFailure`].
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::ValidationError(_) => ErrorKind::Validation,
            Error::Io(_)
            | Error::WalkDir(_)
            | Error::StripPrefix(_)
            | Error::LiblzmaStream(_)
            | Error::Persist(_)
            | Error::NotADirectory(_) => ErrorKind::FileAccess,
            Error::Authorization(_) => ErrorKind::Authorization,
            Error::BucketResolution(_) => ErrorKind::BucketResolution,
            Error::UploadFailure(_) => ErrorKind::UploadFailure,
            Error::JobInProgress => ErrorKind::Busy,
            Error::SerdeYml(_) | Error::SerdeJson(_) => ErrorKind::Config,
            Error::Reqwest(_) | Error::B2Api { .. } | Error::BucketNotFound(_) => ErrorKind::Other,
            Error::WithMsg { error, .. }
            | Error::WithFunctionName { error, .. }
            | Error::WithDebugObjAndFnName { error, .. } => error.kind(),
            Error::LotsOfError(errors) => errors
                .first()
                .map(Error::kind)
                .unwrap_or(ErrorKind::Other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn not_found() -> Error {
        Error::from(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "file not found",
        ))
    }

    #[test]
    fn test_error_with_msg() {
        match not_found().add_msg("Custom message") {
            Error::WithMsg { msg, .. } => assert_eq!(msg, "Custom message"),
            _ => panic!("Expected WithMsg error"),
        }
    }

    #[test]
    fn test_error_with_fn_name_display() {
        let error_str = not_found().add_fn_name("build_archive").to_string();

        assert!(error_str.contains("build_archive failed"));
        assert!(error_str.contains("file not found"));
    }

    #[test]
    fn test_error_with_debug_object_and_fn_name() {
        let error = not_found().add_debug_object_and_fn_name(42, "test_function");
        let error_str = error.to_string();

        assert!(error_str.starts_with("42 test_function failed"));
        assert!(error_str.contains("file not found"));
    }

    #[test]
    fn test_error_from_vec() {
        let combined = Error::from(vec![not_found(), not_found().chain(not_found())]);
        match combined {
            Error::LotsOfError(errors) => assert_eq!(errors.len(), 3),
            _ => panic!("Expected LotsOfError"),
        }
    }

    #[test]
    #[should_panic(expected = "Should not create lots of errors when error is empty")]
    fn test_error_from_empty_vec_panics() {
        let _error = Error::from(Vec::<Error>::new());
    }

    #[test]
    fn test_kind_sees_through_context() {
        let error = not_found()
            .add_fn_name("build")
            .add_msg("Creating agents archive failed");
        assert_eq!(error.kind(), ErrorKind::FileAccess);
    }

    #[test]
    fn test_remote_kind_wins_over_wrapped_error() {
        let error = Error::upload_failure(not_found()).add_msg("outputs.tar.gz");
        assert_eq!(error.kind(), ErrorKind::UploadFailure);

        let error = Error::authorization(Error::b2_api(401u16, "unauthorized", "bad key"));
        assert_eq!(error.kind(), ErrorKind::Authorization);
        assert!(error.to_string().contains("bad key"));
    }

    #[test]
    fn test_kind_of_error_list_is_first_kind() {
        let error = Error::upload_failure(not_found()).chain(not_found());
        assert_eq!(error.kind(), ErrorKind::UploadFailure);
    }

    #[test]
    fn test_job_in_progress_is_busy() {
        assert_eq!(Error::job_in_progress().kind(), ErrorKind::Busy);
    }
}
