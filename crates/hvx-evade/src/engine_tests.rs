use std::{cell::RefCell, collections::HashMap};

use hvx_core::{ProcessId, Va};
use tracing::Level;

use super::*;
use crate::{INVALID_SYSCALL_NUMBER, SyscallRoutine, TracingLogSink};

///////////////////////////////////////////////////////////////////////////////
// Mock collaborators
///////////////////////////////////////////////////////////////////////////////

#[derive(Default)]
struct MockInterception {
    installed: bool,
    initialize_calls: usize,
    uninitialize_calls: usize,
    fail: bool,
}

impl SyscallInterception for MockInterception {
    fn initialize(&mut self, callbacks: &EvadeCallbacks<'_>) -> Result<(), HvxError> {
        self.initialize_calls += 1;
        callbacks.log.log(Level::DEBUG, "installing syscall hooks");

        if self.fail {
            return Err(HvxError::Unsuccessful);
        }

        self.installed = true;
        Ok(())
    }

    fn uninitialize(&mut self) {
        self.uninitialize_calls += 1;
        self.installed = false;
    }
}

#[derive(Default)]
struct MockBackend {
    hidden: bool,
    hide_error: Option<fn() -> HvxError>,
    unhide_error: Option<fn() -> HvxError>,
    open_file_number: Option<u32>,
    target_name: Option<String>,
}

impl HideBackend for MockBackend {
    fn hide(
        &mut self,
        callbacks: &EvadeCallbacks<'_>,
        syscall_numbers: &SyscallNumberTable,
    ) -> Result<(), HvxError> {
        if let Some(error) = self.hide_error {
            return Err(error());
        }

        self.open_file_number = syscall_numbers.get(SyscallRoutine::OpenFile);
        self.target_name = callbacks.process_names.process_name(ProcessId(4));
        self.hidden = true;
        Ok(())
    }

    fn unhide(&mut self) -> Result<(), HvxError> {
        if let Some(error) = self.unhide_error {
            return Err(error());
        }

        self.hidden = false;
        Ok(())
    }
}

/// Host whose stub table decodes `0x100 + index` for every routine except
/// the missing ones.
struct MockHost {
    missing: Vec<SyscallRoutine>,
    lookups: RefCell<HashMap<String, usize>>,
}

impl MockHost {
    fn new() -> Self {
        Self::missing(&[])
    }

    fn missing(routines: &[SyscallRoutine]) -> Self {
        Self {
            missing: routines.to_vec(),
            lookups: RefCell::new(HashMap::new()),
        }
    }

    fn lookups(&self) -> usize {
        self.lookups.borrow().values().sum()
    }
}

impl SyscallSource for MockHost {
    fn routine_address(&self, name: &str) -> Option<Va> {
        *self.lookups.borrow_mut().entry(name.into()).or_default() += 1;

        let index = SyscallRoutine::ALL
            .iter()
            .position(|routine| routine.routine_name() == name)?;

        if self.missing.contains(&SyscallRoutine::ALL[index]) {
            return None;
        }

        Some(Va(0x1000 + index as u64 * 0x10))
    }

    fn read_code(&self, va: Va, buffer: &mut [u8]) -> Result<(), HvxError> {
        // Every slot is `mov eax, 0x100 + index` followed by `int3` padding.
        for (offset, byte) in buffer.iter_mut().enumerate() {
            let address = va.0 + offset as u64;
            let index = (address - 0x1000) / 0x10;
            *byte = match address % 0x10 {
                0 => 0xb8,
                1 => (0x100 + index as u32).to_le_bytes()[0],
                2 => (0x100 + index as u32).to_le_bytes()[1],
                3 | 4 => 0,
                _ => 0xcc,
            };
        }

        Ok(())
    }
}

impl TargetMemory for MockHost {
    fn check_access(&self, _pid: ProcessId, _va: Va, _len: usize) -> bool {
        false
    }

    fn read(&self, _pid: ProcessId, va: Va, _buffer: &mut [u8]) -> Result<(), HvxError> {
        Err(HvxError::InvalidAddress(va))
    }

    fn write(&self, _pid: ProcessId, va: Va, _buffer: &[u8]) -> Result<(), HvxError> {
        Err(HvxError::InvalidAddress(va))
    }
}

impl ProcessNames for MockHost {
    fn process_name(&self, pid: ProcessId) -> Option<String> {
        (pid == ProcessId(4)).then(|| String::from("System"))
    }
}

impl TrapFlag for MockHost {
    fn set_after_syscall(&self, _core: u32, _pid: ProcessId, _thread_id: u32, _context: u64) -> bool {
        true
    }

    fn handle(&self, _core: u32) -> bool {
        false
    }
}

impl ExceptionInjector for MockHost {
    fn inject_general_protection(&self, _core: u32) {}
}

impl EvadeHost for MockHost {
    fn syscall_source(&self) -> &dyn SyscallSource {
        self
    }

    fn log_sink(&self) -> &dyn LogSink {
        &TracingLogSink
    }

    fn target_memory(&self) -> &dyn TargetMemory {
        self
    }

    fn process_names(&self) -> &dyn ProcessNames {
        self
    }

    fn trap_flag(&self) -> &dyn TrapFlag {
        self
    }

    fn exception_injector(&self) -> &dyn ExceptionInjector {
        self
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_test_writer()
        .try_init();
}

type Engine = TransparencyEngine<MockInterception, MockBackend, MockHost>;

fn engine(host: MockHost) -> Engine {
    TransparencyEngine::new(MockInterception::default(), MockBackend::default(), host)
}

///////////////////////////////////////////////////////////////////////////////
// Tests
///////////////////////////////////////////////////////////////////////////////

#[test]
fn starts_visible_and_unresolved() {
    let engine = engine(MockHost::new());

    assert_eq!(engine.state(), TransparencyState::Visible);
    assert!(!engine.footprint_check_active());
    assert!(engine.syscall_numbers().is_none());
    assert_eq!(engine.host().lookups(), 0);
}

#[test]
fn enable_hides_and_raises_footprint_flag() -> Result<(), HvxError> {
    init_tracing();
    let mut engine = engine(MockHost::new());

    let coverage = engine.enable()?;

    assert_eq!(coverage, Coverage::Full);
    assert_eq!(engine.state(), TransparencyState::Hidden);
    assert!(engine.footprint_check_active());
    assert!(engine.interception().installed);
    assert!(engine.backend().hidden);
    assert_eq!(engine.backend().open_file_number, Some(0x10a));
    assert_eq!(engine.backend().target_name.as_deref(), Some("System"));

    Ok(())
}

#[test]
fn second_enable_is_already_hidden() -> Result<(), HvxError> {
    let mut engine = engine(MockHost::new());
    engine.enable()?;

    let result = engine.enable();

    assert!(matches!(result, Err(HvxError::AlreadyHidden)));
    assert_eq!(engine.state(), TransparencyState::Hidden);
    assert_eq!(engine.interception().initialize_calls, 1);

    Ok(())
}

#[test]
fn disable_after_enable_then_again_is_already_unhidden() -> Result<(), HvxError> {
    let mut engine = engine(MockHost::new());
    engine.enable()?;
    assert!(matches!(engine.enable(), Err(HvxError::AlreadyHidden)));

    engine.disable()?;
    assert_eq!(engine.state(), TransparencyState::Visible);
    assert!(!engine.footprint_check_active());

    let result = engine.disable();
    assert!(matches!(result, Err(HvxError::AlreadyUnhidden)));
    assert_eq!(engine.state(), TransparencyState::Visible);

    Ok(())
}

#[test]
fn round_trip_restores_state_and_uninitializes_interception() -> Result<(), HvxError> {
    let mut engine = engine(MockHost::new());
    let before = engine.state();

    engine.enable()?;
    engine.disable()?;

    assert_eq!(engine.state(), before);
    assert!(!engine.interception().installed);
    assert_eq!(engine.interception().uninitialize_calls, 1);
    assert!(!engine.backend().hidden);

    Ok(())
}

#[test]
fn syscall_numbers_are_resolved_once() -> Result<(), HvxError> {
    let mut engine = engine(MockHost::new());

    engine.enable()?;
    engine.disable()?;
    engine.enable()?;

    assert_eq!(engine.host().lookups(), SyscallRoutine::ALL.len());
    assert!(engine.syscall_numbers().is_some_and(SyscallNumberTable::fully_resolved));

    Ok(())
}

#[test]
fn disable_uninitializes_even_when_visible() {
    let mut engine = engine(MockHost::new());

    let result = engine.disable();

    assert!(matches!(result, Err(HvxError::AlreadyUnhidden)));
    assert_eq!(engine.interception().uninitialize_calls, 1);
}

#[test]
fn interception_failure_leaves_state_unchanged() {
    let mut engine = TransparencyEngine::new(
        MockInterception {
            fail: true,
            ..Default::default()
        },
        MockBackend::default(),
        MockHost::new(),
    );

    let result = engine.enable();

    assert!(matches!(result, Err(HvxError::UnableToHideOrUnhideDebugger)));
    assert_eq!(engine.state(), TransparencyState::Visible);
    assert!(!engine.footprint_check_active());
    assert!(!engine.backend().hidden);
}

#[test]
fn hide_failure_propagates_and_uninitializes_interception() {
    let mut engine = TransparencyEngine::new(
        MockInterception::default(),
        MockBackend {
            hide_error: Some(|| HvxError::Unsuccessful),
            ..Default::default()
        },
        MockHost::new(),
    );

    let result = engine.enable();

    assert!(matches!(result, Err(HvxError::Unsuccessful)));
    assert_eq!(engine.state(), TransparencyState::Visible);
    assert!(!engine.interception().installed);
}

#[test]
fn unhide_failure_leaves_state_hidden() -> Result<(), HvxError> {
    let mut engine = TransparencyEngine::new(
        MockInterception::default(),
        MockBackend {
            unhide_error: Some(|| HvxError::AlreadyUnhidden),
            ..Default::default()
        },
        MockHost::new(),
    );
    engine.enable()?;

    let result = engine.disable();

    assert!(matches!(result, Err(HvxError::AlreadyUnhidden)));
    assert_eq!(engine.state(), TransparencyState::Hidden);
    assert!(engine.footprint_check_active());

    Ok(())
}

#[test]
fn required_miss_is_allowed_by_default_policy() -> Result<(), HvxError> {
    init_tracing();
    let mut engine = engine(MockHost::missing(&[SyscallRoutine::QueryValueKey]));

    let coverage = engine.enable()?;

    assert_eq!(
        coverage,
        Coverage::Partial {
            unresolved: [SyscallRoutine::QueryValueKey].into_iter().collect()
        }
    );
    assert_eq!(engine.state(), TransparencyState::Hidden);

    let table = engine.syscall_numbers().ok_or(HvxError::NotFound)?;
    assert!(!table.fully_resolved());
    assert_eq!(table.raw(SyscallRoutine::QueryValueKey), INVALID_SYSCALL_NUMBER);

    Ok(())
}

#[test]
fn required_miss_is_rejected_under_full_coverage_policy() {
    let mut engine = engine(MockHost::missing(&[SyscallRoutine::SystemDebugControl]))
        .with_config(TransparencyConfig {
            coverage_policy: CoveragePolicy::RequireFull,
        });

    let result = engine.enable();

    assert!(matches!(result, Err(HvxError::UnableToHideOrUnhideDebugger)));
    assert_eq!(engine.state(), TransparencyState::Visible);
    assert_eq!(engine.interception().initialize_calls, 0);
}

#[test]
fn optional_miss_satisfies_full_coverage_policy() -> Result<(), HvxError> {
    let mut engine = engine(MockHost::missing(&[SyscallRoutine::OpenKeyEx]))
        .with_config(TransparencyConfig {
            coverage_policy: CoveragePolicy::RequireFull,
        });

    let coverage = engine.enable()?;

    assert!(!coverage.is_full());
    assert_eq!(engine.state(), TransparencyState::Hidden);

    Ok(())
}

#[test]
fn default_mode_accepts_partial_coverage_and_is_idempotent() -> Result<(), HvxError> {
    let mut engine = engine(MockHost::missing(&[SyscallRoutine::QuerySystemInformation]))
        .with_config(TransparencyConfig {
            coverage_policy: CoveragePolicy::RequireFull,
        });

    let coverage = engine.enable_default_mode()?;
    assert!(!coverage.is_full());
    assert_eq!(engine.state(), TransparencyState::Hidden);

    let again = engine.enable_default_mode()?;
    assert_eq!(again, coverage);
    assert_eq!(engine.interception().initialize_calls, 1);

    Ok(())
}

#[test]
fn default_config_allows_partial_coverage() {
    assert_eq!(
        TransparencyConfig::default().coverage_policy,
        CoveragePolicy::AllowPartial
    );
}
