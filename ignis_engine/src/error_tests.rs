//! Display text and trait impls of every `Error` variant

use crate::error::{Error, Result};

// ============================================================================
// ERROR DISPLAY TESTS
// ============================================================================

#[test]
fn test_backend_error_display() {
    let err = Error::BackendError("vkQueueSubmit2 failed".to_string());
    let display = format!("{}", err);
    assert!(display.contains("Backend error"));
    assert!(display.contains("vkQueueSubmit2 failed"));
}

#[test]
fn test_out_of_memory_display() {
    let err = Error::OutOfMemory;
    assert_eq!(format!("{}", err), "Out of GPU memory");
}

#[test]
fn test_invalid_resource_display() {
    let err = Error::InvalidResource("write past end of buffer".to_string());
    let display = format!("{}", err);
    assert!(display.contains("Invalid resource"));
    assert!(display.contains("write past end of buffer"));
}

#[test]
fn test_initialization_failed_display() {
    let err = Error::InitializationFailed("No Vulkan-capable GPU found".to_string());
    let display = format!("{}", err);
    assert!(display.contains("Initialization failed"));
    assert!(display.contains("No Vulkan-capable GPU found"));
}

#[test]
fn test_missing_feature_display() {
    let err = Error::MissingFeature("BufferDeviceAddress".to_string());
    assert_eq!(
        format!("{}", err),
        "Missing required device feature: BufferDeviceAddress"
    );
}

#[test]
fn test_swapchain_out_of_date_display() {
    assert_eq!(format!("{}", Error::SwapchainOutOfDate), "Swapchain is out of date");
}

// ============================================================================
// ERROR TRAIT IMPLEMENTATIONS
// ============================================================================

#[test]
fn test_error_is_std_error() {
    let err = Error::OutOfMemory;
    let _: &dyn std::error::Error = &err;
}

#[test]
fn test_error_debug() {
    let debug = format!("{:?}", Error::MissingFeature("DynamicRendering".to_string()));
    assert!(debug.contains("MissingFeature"));
    assert!(debug.contains("DynamicRendering"));
}

#[test]
fn test_error_clone_and_eq() {
    let err = Error::InvalidResource("res".to_string());
    assert_eq!(err.clone(), err);
    assert_ne!(Error::OutOfMemory, Error::SwapchainOutOfDate);
}

// ============================================================================
// ERROR PROPAGATION TESTS
// ============================================================================

#[test]
fn test_missing_feature_propagates_through_question_mark() {
    fn check(enabled: &[&str], name: &str) -> Result<()> {
        if enabled.contains(&name) {
            Ok(())
        } else {
            Err(Error::MissingFeature(name.to_string()))
        }
    }

    fn bring_up(enabled: &[&str]) -> Result<u32> {
        check(enabled, "DynamicRendering")?;
        check(enabled, "Synchronization2")?;
        Ok(1)
    }

    assert_eq!(bring_up(&["DynamicRendering", "Synchronization2"]), Ok(1));
    assert_eq!(
        bring_up(&["DynamicRendering"]),
        Err(Error::MissingFeature("Synchronization2".to_string()))
    );
}
