/// Vulkan Debug Messenger - routes validation layer messages to the engine logger
///
/// Messages are forwarded to the `ignis_*!` macros under the "ignis::vulkan"
/// source, counted per severity, and grouped so repeated messages are
/// flagged with their occurrence count.

use ash::vk;
use colored::*;
use ignis_engine::{ignis_error, ignis_info, ignis_trace, ignis_warn};
use rustc_hash::FxHashMap;
use std::ffi::CStr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

/// Validation message counters since the last device creation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidationStats {
    pub errors: u32,
    pub warnings: u32,
    pub info: u32,
    pub verbose: u32,
}

impl ValidationStats {
    pub fn total(&self) -> u32 {
        self.errors + self.warnings + self.info + self.verbose
    }

    pub fn has_errors(&self) -> bool {
        self.errors > 0
    }
}

/// Set while a debug messenger is installed
static ENABLED: AtomicBool = AtomicBool::new(false);

/// Global validation statistics (thread-safe atomic counters)
static VALIDATION_STATS: ValidationStatsTracker = ValidationStatsTracker::new();

/// Occurrences per message text
static MESSAGE_COUNTS: Mutex<Option<FxHashMap<String, u32>>> = Mutex::new(None);

struct ValidationStatsTracker {
    errors: AtomicU32,
    warnings: AtomicU32,
    info: AtomicU32,
    verbose: AtomicU32,
}

impl ValidationStatsTracker {
    const fn new() -> Self {
        Self {
            errors: AtomicU32::new(0),
            warnings: AtomicU32::new(0),
            info: AtomicU32::new(0),
            verbose: AtomicU32::new(0),
        }
    }

    fn record(&self, severity: vk::DebugUtilsMessageSeverityFlagsEXT) {
        let counter = if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
            &self.errors
        } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
            &self.warnings
        } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
            &self.info
        } else {
            &self.verbose
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn get_stats(&self) -> ValidationStats {
        ValidationStats {
            errors: self.errors.load(Ordering::Relaxed),
            warnings: self.warnings.load(Ordering::Relaxed),
            info: self.info.load(Ordering::Relaxed),
            verbose: self.verbose.load(Ordering::Relaxed),
        }
    }

    fn reset(&self) {
        self.errors.store(0, Ordering::Relaxed);
        self.warnings.store(0, Ordering::Relaxed);
        self.info.store(0, Ordering::Relaxed);
        self.verbose.store(0, Ordering::Relaxed);
    }
}

/// Reset statistics and start accepting messages
#[cfg_attr(not(feature = "vulkan-validation"), allow(dead_code))]
pub(crate) fn init_debug_config() {
    VALIDATION_STATS.reset();
    if let Ok(mut counts) = MESSAGE_COUNTS.lock() {
        *counts = Some(FxHashMap::default());
    }
    ENABLED.store(true, Ordering::Release);
}

/// Stop accepting messages (called before the messenger is destroyed)
pub(crate) fn cleanup_debug_config() {
    ENABLED.store(false, Ordering::Release);
}

/// Get current validation statistics
pub fn get_validation_stats() -> ValidationStats {
    VALIDATION_STATS.get_stats()
}

/// Print validation statistics report
pub fn print_validation_stats_report() {
    let stats = get_validation_stats();

    if stats.total() == 0 {
        println!("\n{}", "No validation messages".green().bold());
        return;
    }

    println!("\n{}", "=== Validation Statistics Report ===".bright_blue().bold());
    if stats.errors > 0 {
        println!("  {} {}", "Errors:".red().bold(), stats.errors);
    }
    if stats.warnings > 0 {
        println!("  {} {}", "Warnings:".yellow().bold(), stats.warnings);
    }
    if stats.info > 0 {
        println!("  {} {}", "Info:".cyan(), stats.info);
    }
    if stats.verbose > 0 {
        println!("  {} {}", "Verbose:".bright_black(), stats.verbose);
    }
    println!("  {} {}", "Total:".white().bold(), stats.total());

    let repeated = MESSAGE_COUNTS
        .lock()
        .ok()
        .and_then(|counts| counts.as_ref().map(|c| c.values().filter(|&&n| n > 1).count()))
        .unwrap_or(0);
    if repeated > 0 {
        println!("\n  {} message(s) appeared multiple times", repeated);
    }

    println!("{}\n", "====================================".bright_blue().bold());
}

fn track_message(message: &str) -> u32 {
    let Ok(mut guard) = MESSAGE_COUNTS.lock() else {
        return 1;
    };
    let counts = guard.get_or_insert_with(FxHashMap::default);
    let count = counts.entry(message.to_string()).or_insert(0);
    *count += 1;
    *count
}

fn message_type_name(message_type: vk::DebugUtilsMessageTypeFlagsEXT) -> &'static str {
    if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION) {
        "Validation"
    } else if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE) {
        "Performance"
    } else {
        "General"
    }
}

unsafe fn c_str_or<'a>(ptr: *const std::os::raw::c_char, fallback: &'a str) -> std::borrow::Cow<'a, str> {
    if ptr.is_null() {
        std::borrow::Cow::Borrowed(fallback)
    } else {
        CStr::from_ptr(ptr).to_string_lossy()
    }
}

/// Vulkan debug messenger callback
///
/// Called by the validation layers when they detect issues.
#[cfg_attr(not(feature = "vulkan-validation"), allow(dead_code))]
pub(crate) unsafe extern "system" fn vulkan_debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user_data: *mut std::os::raw::c_void,
) -> vk::Bool32 {
    if !ENABLED.load(Ordering::Acquire) || p_callback_data.is_null() {
        return vk::FALSE;
    }

    let callback_data = &*p_callback_data;
    let message_id = c_str_or(callback_data.p_message_id_name, "Unknown");
    let message = c_str_or(callback_data.p_message, "No message");

    VALIDATION_STATS.record(message_severity);
    let occurrences = track_message(&message);
    let repeat = if occurrences > 1 {
        format!(" [x{}]", occurrences)
    } else {
        String::new()
    };
    let type_name = message_type_name(message_type);

    if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        ignis_error!("ignis::vulkan", "[{}]{} {}: {}", type_name, repeat, message_id, message);
    } else if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        ignis_warn!("ignis::vulkan", "[{}]{} {}: {}", type_name, repeat, message_id, message);
    } else if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        ignis_info!("ignis::vulkan", "[{}]{} {}: {}", type_name, repeat, message_id, message);
    } else {
        ignis_trace!("ignis::vulkan", "[{}]{} {}: {}", type_name, repeat, message_id, message);
    }

    vk::FALSE // Don't abort the Vulkan call
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_total() {
        let stats = ValidationStats { errors: 1, warnings: 2, info: 3, verbose: 4 };
        assert_eq!(stats.total(), 10);
        assert!(stats.has_errors());
        assert!(!ValidationStats::default().has_errors());
    }

    #[test]
    fn test_message_type_names() {
        assert_eq!(message_type_name(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION), "Validation");
        assert_eq!(message_type_name(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE), "Performance");
        assert_eq!(message_type_name(vk::DebugUtilsMessageTypeFlagsEXT::GENERAL), "General");
    }
}
