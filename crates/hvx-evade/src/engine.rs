use hvx_core::HvxError;
use serde::{Deserialize, Serialize};

use crate::{
    Coverage, CoveragePolicy, EvadeCallbacks, ExceptionInjector, LogSink, ProcessNames,
    SyscallNumberTable, SyscallSource, TargetMemory, TransparencyConfig, TrapFlag,
};

/// Whether the debugger is hidden from the guest.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransparencyState {
    /// Transparent mode is off.
    #[default]
    Visible,

    /// Transparent mode is on.
    Hidden,
}

/// The hypervisor's system-call interception layer.
pub trait SyscallInterception {
    /// Installs the interception hooks.
    fn initialize(&mut self, callbacks: &EvadeCallbacks<'_>) -> Result<(), HvxError>;

    /// Removes the interception hooks. Must be safe to call when the hooks
    /// are not installed.
    fn uninitialize(&mut self);
}

/// The component that conceals hypervisor artifacts from the guest.
pub trait HideBackend {
    /// Starts concealing, using `syscall_numbers` to recognize the
    /// intercepted services.
    fn hide(
        &mut self,
        callbacks: &EvadeCallbacks<'_>,
        syscall_numbers: &SyscallNumberTable,
    ) -> Result<(), HvxError>;

    /// Stops concealing.
    fn unhide(&mut self) -> Result<(), HvxError>;
}

/// The collaborators transparent mode depends on.
pub trait EvadeHost {
    /// Where the intercepted system-service stubs are found.
    fn syscall_source(&self) -> &dyn SyscallSource;

    /// Log sink of the hide backend.
    fn log_sink(&self) -> &dyn LogSink;

    /// Memory access to the debugged processes.
    fn target_memory(&self) -> &dyn TargetMemory;

    /// Process name lookup.
    fn process_names(&self) -> &dyn ProcessNames;

    /// Trap-flag handling.
    fn trap_flag(&self) -> &dyn TrapFlag;

    /// Exception injection.
    fn exception_injector(&self) -> &dyn ExceptionInjector;
}

impl<'a> EvadeCallbacks<'a> {
    /// Collects the callbacks provided by `host`.
    pub fn from_host(host: &'a impl EvadeHost) -> Self {
        Self {
            log: host.log_sink(),
            memory: host.target_memory(),
            process_names: host.process_names(),
            trap_flag: host.trap_flag(),
            exceptions: host.exception_injector(),
        }
    }
}

/// Owner of the transparent-mode state.
///
/// The state and the interception hooks change together, under `&mut
/// self`. Callers sharing an engine between cores serialize access to it
/// the way they serialize any other `&mut` access.
pub struct TransparencyEngine<Interception, Backend, Host>
where
    Interception: SyscallInterception,
    Backend: HideBackend,
    Host: EvadeHost,
{
    interception: Interception,
    backend: Backend,
    host: Host,
    config: TransparencyConfig,
    state: TransparencyState,
    footprint_check_active: bool,
    syscall_numbers: Option<SyscallNumberTable>,
}

impl<Interception, Backend, Host> TransparencyEngine<Interception, Backend, Host>
where
    Interception: SyscallInterception,
    Backend: HideBackend,
    Host: EvadeHost,
{
    /// Creates a new engine in the [`TransparencyState::Visible`] state.
    pub fn new(interception: Interception, backend: Backend, host: Host) -> Self {
        Self {
            interception,
            backend,
            host,
            config: TransparencyConfig::default(),
            state: TransparencyState::Visible,
            footprint_check_active: false,
            syscall_numbers: None,
        }
    }

    /// Sets the configuration.
    pub fn with_config(self, config: TransparencyConfig) -> Self {
        Self { config, ..self }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &TransparencyConfig {
        &self.config
    }

    /// Returns the current state.
    pub fn state(&self) -> TransparencyState {
        self.state
    }

    /// Returns `true` while footprint checks are active, i.e. while the
    /// debugger is hidden.
    pub fn footprint_check_active(&self) -> bool {
        self.footprint_check_active
    }

    /// Returns the syscall-number table, if it has been resolved.
    pub fn syscall_numbers(&self) -> Option<&SyscallNumberTable> {
        self.syscall_numbers.as_ref()
    }

    /// Returns the interception subsystem.
    pub fn interception(&self) -> &Interception {
        &self.interception
    }

    /// Returns the hide backend.
    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    /// Returns the host.
    pub fn host(&self) -> &Host {
        &self.host
    }

    /// Resolves the syscall-number table on first use and returns it.
    pub fn resolve_syscall_numbers(&mut self) -> &SyscallNumberTable {
        self.syscall_numbers
            .get_or_insert_with(|| SyscallNumberTable::resolve(self.host.syscall_source()))
    }

    /// Enables transparent mode, applying the configured coverage policy.
    ///
    /// # Errors
    ///
    /// - [`HvxError::AlreadyHidden`] if transparent mode is already on.
    /// - [`HvxError::UnableToHideOrUnhideDebugger`] if the policy rejects
    ///   the resolved coverage, or the interception subsystem fails to
    ///   initialize.
    /// - Any error of the hide backend.
    pub fn enable(&mut self) -> Result<Coverage, HvxError> {
        self.enable_with(self.config.coverage_policy)
    }

    /// Enables transparent mode at startup.
    ///
    /// Partial coverage is accepted with a warning, and an engine that is
    /// already hidden is left as is.
    pub fn enable_default_mode(&mut self) -> Result<Coverage, HvxError> {
        match self.enable_with(CoveragePolicy::AllowPartial) {
            Err(HvxError::AlreadyHidden) => {
                tracing::debug!("transparent mode is already enabled");
                Ok(self.resolve_syscall_numbers().coverage())
            }
            result => result,
        }
    }

    /// Disables transparent mode.
    ///
    /// The interception subsystem is uninitialized first, in every case.
    ///
    /// # Errors
    ///
    /// - [`HvxError::AlreadyUnhidden`] if transparent mode is already off.
    /// - Any error of the hide backend, in which case the state is left
    ///   unchanged.
    pub fn disable(&mut self) -> Result<(), HvxError> {
        self.interception.uninitialize();

        if self.state == TransparencyState::Visible {
            return Err(HvxError::AlreadyUnhidden);
        }

        if let Err(err) = self.backend.unhide() {
            tracing::warn!(%err, "unable to reveal the debugger");
            return Err(err);
        }

        self.state = TransparencyState::Visible;
        self.footprint_check_active = false;
        tracing::info!("transparent mode disabled");

        Ok(())
    }

    fn enable_with(&mut self, policy: CoveragePolicy) -> Result<Coverage, HvxError> {
        if self.state == TransparencyState::Hidden {
            return Err(HvxError::AlreadyHidden);
        }

        let syscall_numbers = self
            .syscall_numbers
            .get_or_insert_with(|| SyscallNumberTable::resolve(self.host.syscall_source()));

        let coverage = syscall_numbers.coverage();
        if !syscall_numbers.fully_resolved() {
            match policy {
                CoveragePolicy::AllowPartial => {
                    tracing::warn!(?coverage, "required syscall numbers are unresolved, coverage is partial");
                }
                CoveragePolicy::RequireFull => {
                    tracing::warn!(?coverage, "full syscall coverage is required");
                    return Err(HvxError::UnableToHideOrUnhideDebugger);
                }
            }
        }

        let callbacks = EvadeCallbacks::from_host(&self.host);

        if let Err(err) = self.interception.initialize(&callbacks) {
            tracing::warn!(%err, "unable to initialize syscall interception");
            return Err(HvxError::UnableToHideOrUnhideDebugger);
        }

        if let Err(err) = self.backend.hide(&callbacks, syscall_numbers) {
            tracing::warn!(%err, "unable to hide the debugger");
            self.interception.uninitialize();
            return Err(err);
        }

        self.state = TransparencyState::Hidden;
        self.footprint_check_active = true;
        tracing::info!(full = coverage.is_full(), "transparent mode enabled");

        Ok(coverage)
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
