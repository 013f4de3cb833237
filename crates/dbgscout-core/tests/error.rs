//! Tests for error handling

use dbgscout_core::error::{Result, ScoutError, Stage};
use dbgscout_core::registry::ModuleId;
use dbgscout_core::session::{Operation, Phase};

#[test]
fn test_invalid_format_display()
{
    let error = ScoutError::InvalidFormat("bad magic".to_string());
    assert_eq!(error.to_string(), "Invalid format: bad magic");
}

#[test]
fn test_truncated_display()
{
    let error = ScoutError::Truncated {
        what: "note section",
        needed: 64,
        available: 12,
    };
    let message = error.to_string();
    assert!(message.contains("note section"));
    assert!(message.contains("64"));
    assert!(message.contains("12"));
}

#[test]
fn test_out_of_bounds_display()
{
    let error = ScoutError::OutOfBounds {
        offset: 0x40,
        len: 8,
        size: 16,
    };
    assert!(error.to_string().contains("0x40"));
}

#[test]
fn test_session_state_display()
{
    let error = ScoutError::SessionState {
        operation: Operation::Query,
        phase: Phase::Reporting,
    };
    assert!(error.is_session_state());
    let message = error.to_string();
    assert!(message.contains("query"), "{message}");
    assert!(message.contains("reporting"), "{message}");
}

#[test]
fn test_resolution_failed_display()
{
    let error = ScoutError::ResolutionFailed {
        module: "libfoo.so".to_string(),
        stage: Stage::Debug,
    };
    assert!(!error.is_session_state());
    assert_eq!(error.to_string(), "Could not locate debug file for module libfoo.so");
}

#[test]
fn test_unknown_module_display()
{
    let error = ScoutError::UnknownModule(ModuleId::from_raw(3));
    assert_eq!(error.to_string(), "Unknown module handle #3");
}

#[test]
fn test_io_error_conversion()
{
    let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
    let error: ScoutError = io_error.into();
    assert!(matches!(error, ScoutError::Io(_)));
    assert!(error.to_string().contains("missing"));
}

#[test]
fn test_result_alias()
{
    fn fails() -> Result<u32>
    {
        Err(ScoutError::InvalidFormat("empty".into()))
    }
    assert!(fails().is_err());
}
