//! Page-side activation state machine.
//!
//! The coordinator runs once per page load. It registers the header injection
//! worker, waits for it to activate and reloads the page only from the two
//! points where a reload can change the outcome: no controller yet, or a
//! controller without `SharedArrayBuffer`. Each reload starts a fresh load
//! that re-derives everything from [`Observation`]; nothing is resumed.

use crate::config::CoiConfig;
use crate::errors::CoordinatorError;
use crate::runtime::{Observation, PageRuntime, WorkerLifecycle};

/// Upper bound on reloads per browsing session when the reload guard is on.
pub const MAX_RELOADS: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadReason {
    NoController,
    NoSharedMemory,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminal {
    Unsupported,
    Disabled,
    Isolated,
    Reloading(ReloadReason),
    Failed(CoordinatorError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum State {
    Start,
    Registering { reloads_remaining: u32 },
    AwaitingActivation { reloads_remaining: u32 },
    Done(Terminal),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistrationReport {
    pub controlled: bool,
    pub shared_memory: bool,
    pub worker: WorkerLifecycle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Started {
        observation: Observation,
        reloads_issued: u32,
    },
    Registered(RegistrationReport),
    WorkerStateChanged(WorkerLifecycle),
    Failed(CoordinatorError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    None,
    Register,
    AwaitActivation,
    Reload(ReloadReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Coordinator {
    should_register: bool,
    reload_limit: Option<u32>,
}

impl Coordinator {
    pub fn new(config: &CoiConfig) -> Self {
        Self {
            should_register: config.should_register,
            reload_limit: config.reload_guard.then_some(MAX_RELOADS),
        }
    }

    /// Pure transition function. Events that do not apply to `state` leave it
    /// unchanged; a `Done` state absorbs everything.
    pub fn transition(&self, state: State, event: Event) -> (State, Effect) {
        match (state, event) {
            (State::Done(terminal), _) => (State::Done(terminal), Effect::None),
            (
                State::Start,
                Event::Started {
                    observation,
                    reloads_issued,
                },
            ) => self.start(observation, reloads_issued),
            (State::Registering { reloads_remaining }, Event::Registered(report)) => {
                self.registered(report, reloads_remaining)
            }
            (State::AwaitingActivation { reloads_remaining }, Event::WorkerStateChanged(lifecycle)) => {
                match lifecycle {
                    WorkerLifecycle::Active | WorkerLifecycle::Absent => {
                        self.reload(ReloadReason::NoController, reloads_remaining)
                    }
                    WorkerLifecycle::Redundant => done(Terminal::Failed(redundant_worker())),
                    _ => (State::AwaitingActivation { reloads_remaining }, Effect::None),
                }
            }
            (
                State::Registering { .. } | State::AwaitingActivation { .. },
                Event::Failed(error),
            ) => done(Terminal::Failed(error)),
            (state, _) => (state, Effect::None),
        }
    }

    fn start(&self, observation: Observation, reloads_issued: u32) -> (State, Effect) {
        if !observation.registration_supported {
            return done(Terminal::Unsupported);
        }
        if observation.is_isolated() {
            return done(Terminal::Isolated);
        }
        if !self.should_register || observation.deregistered {
            return done(Terminal::Disabled);
        }
        let reloads_remaining = self
            .reload_limit
            .map_or(u32::MAX, |limit| limit.saturating_sub(reloads_issued));
        (State::Registering { reloads_remaining }, Effect::Register)
    }

    fn registered(&self, report: RegistrationReport, reloads_remaining: u32) -> (State, Effect) {
        if !report.controlled {
            return match report.worker {
                WorkerLifecycle::Active | WorkerLifecycle::Absent => {
                    self.reload(ReloadReason::NoController, reloads_remaining)
                }
                WorkerLifecycle::Redundant => done(Terminal::Failed(redundant_worker())),
                WorkerLifecycle::Installing
                | WorkerLifecycle::Waiting
                | WorkerLifecycle::Activating => (
                    State::AwaitingActivation { reloads_remaining },
                    Effect::AwaitActivation,
                ),
            };
        }
        if !report.shared_memory {
            return self.reload(ReloadReason::NoSharedMemory, reloads_remaining);
        }
        done(Terminal::Isolated)
    }

    fn reload(&self, reason: ReloadReason, reloads_remaining: u32) -> (State, Effect) {
        if reloads_remaining == 0 {
            let limit = self.reload_limit.unwrap_or(u32::MAX);
            return done(Terminal::Failed(CoordinatorError::ReloadLimit { limit }));
        }
        (State::Done(Terminal::Reloading(reason)), Effect::Reload(reason))
    }
}

fn done(terminal: Terminal) -> (State, Effect) {
    (State::Done(terminal), Effect::None)
}

fn redundant_worker() -> CoordinatorError {
    CoordinatorError::ActivationFailed("service worker became redundant".to_string())
}

/// Drives the coordinator against `runtime` until it reaches a terminal state.
pub async fn run<R: PageRuntime>(runtime: &R, config: &CoiConfig) -> Terminal {
    if let Err(err) = config.validate() {
        return finish(runtime, Terminal::Failed(err));
    }

    let coordinator = Coordinator::new(config);
    let mut registration: Option<R::Registration> = None;
    let mut state = State::Start;
    let mut event = Event::Started {
        observation: runtime.observe(),
        reloads_issued: runtime.reloads_issued(),
    };

    loop {
        let (next, effect) = coordinator.transition(state, event);
        state = next;
        event = match effect {
            Effect::Register => {
                runtime.info("Setting up threading support...");
                match runtime.register(&config.script_url, &config.scope).await {
                    Ok(reg) => {
                        runtime.info("Service worker registered");
                        let report = RegistrationReport {
                            controlled: runtime.has_controller(),
                            shared_memory: runtime.shared_memory_available(),
                            worker: runtime.lifecycle(&reg),
                        };
                        registration = Some(reg);
                        Event::Registered(report)
                    }
                    Err(err) => Event::Failed(err),
                }
            }
            Effect::AwaitActivation => {
                runtime.info("Waiting for service worker activation...");
                match registration.as_ref() {
                    Some(reg) => match runtime.wait_for_activation(reg).await {
                        Ok(lifecycle) => Event::WorkerStateChanged(lifecycle),
                        Err(err) => Event::Failed(err),
                    },
                    None => Event::Failed(CoordinatorError::ActivationFailed(
                        "no registration to wait on".to_string(),
                    )),
                }
            }
            Effect::Reload(reason) => {
                if let Err(err) = runtime.reload() {
                    return finish(runtime, Terminal::Failed(err));
                }
                runtime.record_reload();
                return finish(runtime, Terminal::Reloading(reason));
            }
            Effect::None => {
                if let State::Done(terminal) = state {
                    return finish(runtime, terminal);
                }
                // wait_for_activation only settles as Active or Redundant
                return finish(
                    runtime,
                    Terminal::Failed(CoordinatorError::ActivationFailed(format!(
                        "coordinator stalled in {state:?}"
                    ))),
                );
            }
        };
    }
}

fn finish<R: PageRuntime>(runtime: &R, terminal: Terminal) -> Terminal {
    match &terminal {
        Terminal::Unsupported => runtime.error(&CoordinatorError::Unsupported.to_string()),
        Terminal::Disabled => runtime.info("Service worker registration skipped"),
        Terminal::Isolated => {
            runtime.clear_reloads();
            runtime.info("✅ Cross-origin isolated, threading enabled");
        }
        Terminal::Reloading(ReloadReason::NoController) => {
            runtime.info("Reloading to activate threading...")
        }
        Terminal::Reloading(ReloadReason::NoSharedMemory) => {
            runtime.info("Reloading to enable SharedArrayBuffer...")
        }
        Terminal::Failed(err) => runtime.error(&format!("Failed to enable threading: {err}")),
    }
    terminal
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use std::cell::{Cell, RefCell};

    fn unisolated() -> Observation {
        Observation {
            registration_supported: true,
            shared_memory: false,
            cross_origin_isolated: false,
            deregistered: false,
        }
    }

    fn started(observation: Observation) -> Event {
        Event::Started {
            observation,
            reloads_issued: 0,
        }
    }

    #[test]
    fn test_start_without_service_workers_is_unsupported() {
        let coordinator = Coordinator::new(&CoiConfig::default());
        let observation = Observation {
            registration_supported: false,
            ..unisolated()
        };
        let (state, effect) = coordinator.transition(State::Start, started(observation));
        assert_eq!(state, State::Done(Terminal::Unsupported));
        assert_eq!(effect, Effect::None);
    }

    #[test]
    fn test_start_when_isolated_does_nothing() {
        let coordinator = Coordinator::new(&CoiConfig::default());
        let observation = Observation {
            registration_supported: true,
            shared_memory: true,
            cross_origin_isolated: true,
            deregistered: false,
        };
        let (state, effect) = coordinator.transition(State::Start, started(observation));
        assert_eq!(state, State::Done(Terminal::Isolated));
        assert_eq!(effect, Effect::None);
    }

    #[test]
    fn test_shared_memory_without_isolation_still_registers() {
        let coordinator = Coordinator::new(&CoiConfig::default());
        let observation = Observation {
            shared_memory: true,
            ..unisolated()
        };
        let (state, effect) = coordinator.transition(State::Start, started(observation));
        assert_eq!(
            state,
            State::Registering {
                reloads_remaining: MAX_RELOADS
            }
        );
        assert_eq!(effect, Effect::Register);
    }

    #[test]
    fn test_reload_budget_accounts_for_previous_reloads() {
        let coordinator = Coordinator::new(&CoiConfig::default());
        let event = Event::Started {
            observation: unisolated(),
            reloads_issued: 1,
        };
        let (state, _) = coordinator.transition(State::Start, event);
        assert_eq!(
            state,
            State::Registering {
                reloads_remaining: 1
            }
        );

        let unguarded = Coordinator::new(&CoiConfig {
            reload_guard: false,
            ..CoiConfig::default()
        });
        let event = Event::Started {
            observation: unisolated(),
            reloads_issued: 7,
        };
        let (state, _) = unguarded.transition(State::Start, event);
        assert_eq!(
            state,
            State::Registering {
                reloads_remaining: u32::MAX
            }
        );
    }

    #[test]
    fn test_uncontrolled_registration_waits_for_installing_worker() {
        let coordinator = Coordinator::new(&CoiConfig::default());
        let report = RegistrationReport {
            controlled: false,
            shared_memory: false,
            worker: WorkerLifecycle::Installing,
        };
        let (state, effect) = coordinator.transition(
            State::Registering {
                reloads_remaining: 2,
            },
            Event::Registered(report),
        );
        assert_eq!(
            state,
            State::AwaitingActivation {
                reloads_remaining: 2
            }
        );
        assert_eq!(effect, Effect::AwaitActivation);

        let (state, effect) =
            coordinator.transition(state, Event::WorkerStateChanged(WorkerLifecycle::Waiting));
        assert_eq!(effect, Effect::None);

        let (state, effect) =
            coordinator.transition(state, Event::WorkerStateChanged(WorkerLifecycle::Active));
        assert_eq!(
            state,
            State::Done(Terminal::Reloading(ReloadReason::NoController))
        );
        assert_eq!(effect, Effect::Reload(ReloadReason::NoController));
    }

    #[test]
    fn test_uncontrolled_registration_with_active_or_absent_worker_reloads() {
        let coordinator = Coordinator::new(&CoiConfig::default());
        for worker in [WorkerLifecycle::Active, WorkerLifecycle::Absent] {
            let report = RegistrationReport {
                controlled: false,
                shared_memory: false,
                worker,
            };
            let (_, effect) = coordinator.transition(
                State::Registering {
                    reloads_remaining: 2,
                },
                Event::Registered(report),
            );
            assert_eq!(effect, Effect::Reload(ReloadReason::NoController), "{worker:?}");
        }
    }

    #[test]
    fn test_controlled_without_shared_memory_reloads_once_more() {
        let coordinator = Coordinator::new(&CoiConfig::default());
        let report = RegistrationReport {
            controlled: true,
            shared_memory: false,
            worker: WorkerLifecycle::Active,
        };
        let (state, effect) = coordinator.transition(
            State::Registering {
                reloads_remaining: 1,
            },
            Event::Registered(report),
        );
        assert_eq!(
            state,
            State::Done(Terminal::Reloading(ReloadReason::NoSharedMemory))
        );
        assert_eq!(effect, Effect::Reload(ReloadReason::NoSharedMemory));
    }

    #[test]
    fn test_exhausted_budget_fails_instead_of_reloading() {
        let coordinator = Coordinator::new(&CoiConfig::default());
        let report = RegistrationReport {
            controlled: true,
            shared_memory: false,
            worker: WorkerLifecycle::Active,
        };
        let (state, effect) = coordinator.transition(
            State::Registering {
                reloads_remaining: 0,
            },
            Event::Registered(report),
        );
        assert_eq!(
            state,
            State::Done(Terminal::Failed(CoordinatorError::ReloadLimit {
                limit: MAX_RELOADS
            }))
        );
        assert_eq!(effect, Effect::None);
    }

    #[test]
    fn test_redundant_worker_fails_without_reload() {
        let coordinator = Coordinator::new(&CoiConfig::default());
        let (state, effect) = coordinator.transition(
            State::AwaitingActivation {
                reloads_remaining: 2,
            },
            Event::WorkerStateChanged(WorkerLifecycle::Redundant),
        );
        assert!(matches!(
            state,
            State::Done(Terminal::Failed(CoordinatorError::ActivationFailed(_)))
        ));
        assert_eq!(effect, Effect::None);
    }

    #[test]
    fn test_done_absorbs_events_and_mismatched_events_are_ignored() {
        let coordinator = Coordinator::new(&CoiConfig::default());
        let (state, effect) = coordinator.transition(
            State::Done(Terminal::Isolated),
            Event::Failed(CoordinatorError::Unsupported),
        );
        assert_eq!(state, State::Done(Terminal::Isolated));
        assert_eq!(effect, Effect::None);

        let (state, effect) = coordinator.transition(
            State::Start,
            Event::WorkerStateChanged(WorkerLifecycle::Active),
        );
        assert_eq!(state, State::Start);
        assert_eq!(effect, Effect::None);
    }

    /// Browser state that survives reloads: the origin's registration record,
    /// the worker's lifecycle and the session's reload history.
    #[derive(Debug, Default)]
    struct Browser {
        supports_workers: bool,
        honors_headers: bool,
        /// Isolation is only recognised on the second controlled load.
        needs_second_navigation: bool,
        registration_fails: bool,
        worker_goes_redundant: bool,
        reload_fails: bool,
        /// Set by a deregistration earlier in the session.
        deregistered: bool,
        registered: bool,
        worker_active: bool,
        controlled_loads: u32,
        register_calls: u32,
        reloads: u32,
        session_reloads: u32,
        lines: Vec<String>,
    }

    impl Browser {
        fn working() -> Self {
            Self {
                supports_workers: true,
                honors_headers: true,
                ..Self::default()
            }
        }
    }

    struct Load<'a> {
        browser: &'a RefCell<Browser>,
        controlled: bool,
        shared_memory: Cell<bool>,
        isolated: bool,
    }

    impl<'a> Load<'a> {
        fn begin(browser: &'a RefCell<Browser>) -> Self {
            let mut b = browser.borrow_mut();
            let controlled = b.supports_workers && b.registered && b.worker_active;
            if controlled {
                b.controlled_loads += 1;
            }
            let isolated = controlled
                && b.honors_headers
                && (!b.needs_second_navigation || b.controlled_loads >= 2);
            Self {
                browser,
                controlled,
                shared_memory: Cell::new(isolated),
                isolated,
            }
        }
    }

    impl PageRuntime for Load<'_> {
        type Registration = ();

        fn observe(&self) -> Observation {
            Observation {
                registration_supported: self.browser.borrow().supports_workers,
                shared_memory: self.shared_memory.get(),
                cross_origin_isolated: self.isolated,
                deregistered: self.browser.borrow().deregistered,
            }
        }

        fn has_controller(&self) -> bool {
            self.controlled
        }

        fn shared_memory_available(&self) -> bool {
            self.shared_memory.get()
        }

        async fn register(&self, script_url: &str, scope: &str) -> Result<(), CoordinatorError> {
            let mut b = self.browser.borrow_mut();
            b.register_calls += 1;
            assert_eq!(script_url, "./enable-threading.js");
            assert_eq!(scope, "./");
            if b.registration_fails {
                return Err(CoordinatorError::RegistrationFailed(
                    "SecurityError".to_string(),
                ));
            }
            b.registered = true;
            Ok(())
        }

        fn lifecycle(&self, _registration: &()) -> WorkerLifecycle {
            if self.browser.borrow().worker_active {
                WorkerLifecycle::Active
            } else {
                WorkerLifecycle::Installing
            }
        }

        async fn wait_for_activation(
            &self,
            _registration: &(),
        ) -> Result<WorkerLifecycle, CoordinatorError> {
            let mut b = self.browser.borrow_mut();
            if b.worker_goes_redundant {
                return Ok(WorkerLifecycle::Redundant);
            }
            b.worker_active = true;
            Ok(WorkerLifecycle::Active)
        }

        fn reload(&self) -> Result<(), CoordinatorError> {
            let mut b = self.browser.borrow_mut();
            if b.reload_fails {
                return Err(CoordinatorError::ReloadFailed("navigation blocked".to_string()));
            }
            b.reloads += 1;
            Ok(())
        }

        fn reloads_issued(&self) -> u32 {
            self.browser.borrow().session_reloads
        }

        fn record_reload(&self) {
            self.browser.borrow_mut().session_reloads += 1;
        }

        fn clear_reloads(&self) {
            self.browser.borrow_mut().session_reloads = 0;
        }

        fn info(&self, message: &str) {
            self.browser.borrow_mut().lines.push(format!("info: {message}"));
        }

        fn error(&self, message: &str) {
            self.browser.borrow_mut().lines.push(format!("error: {message}"));
        }
    }

    /// Runs page loads until the coordinator stops asking for a reload.
    fn load_until_settled(browser: &RefCell<Browser>, config: &CoiConfig) -> Vec<Terminal> {
        let mut outcomes = Vec::new();
        for _ in 0..10 {
            let load = Load::begin(browser);
            let terminal = block_on(run(&load, config));
            let reloading = matches!(terminal, Terminal::Reloading(_));
            outcomes.push(terminal);
            if !reloading {
                break;
            }
        }
        outcomes
    }

    #[test]
    fn test_fresh_page_reaches_isolation_after_one_reload() {
        let browser = RefCell::new(Browser::working());
        let outcomes = load_until_settled(&browser, &CoiConfig::default());

        assert_eq!(
            outcomes,
            vec![
                Terminal::Reloading(ReloadReason::NoController),
                Terminal::Isolated
            ]
        );
        let b = browser.borrow();
        assert_eq!(b.reloads, 1);
        assert_eq!(b.register_calls, 1);
        assert_eq!(b.session_reloads, 0, "isolation clears the reload history");
        assert!(b
            .lines
            .iter()
            .any(|line| line.contains("Reloading to activate threading")));
    }

    #[test]
    fn test_second_navigation_is_bounded_to_two_reloads() {
        let browser = RefCell::new(Browser {
            needs_second_navigation: true,
            ..Browser::working()
        });
        let outcomes = load_until_settled(&browser, &CoiConfig::default());

        assert_eq!(
            outcomes,
            vec![
                Terminal::Reloading(ReloadReason::NoController),
                Terminal::Reloading(ReloadReason::NoSharedMemory),
                Terminal::Isolated,
            ]
        );
        assert_eq!(browser.borrow().reloads, 2);
    }

    #[test]
    fn test_already_isolated_page_makes_no_calls() {
        let browser = RefCell::new(Browser {
            registered: true,
            worker_active: true,
            ..Browser::working()
        });
        let outcomes = load_until_settled(&browser, &CoiConfig::default());

        assert_eq!(outcomes, vec![Terminal::Isolated]);
        let b = browser.borrow();
        assert_eq!(b.register_calls, 0);
        assert_eq!(b.reloads, 0);
    }

    #[test]
    fn test_browser_ignoring_headers_stops_at_reload_limit() {
        let browser = RefCell::new(Browser {
            honors_headers: false,
            ..Browser::working()
        });
        let outcomes = load_until_settled(&browser, &CoiConfig::default());

        assert_eq!(
            outcomes.last(),
            Some(&Terminal::Failed(CoordinatorError::ReloadLimit {
                limit: MAX_RELOADS
            }))
        );
        assert_eq!(browser.borrow().reloads, MAX_RELOADS);
    }

    #[test]
    fn test_unsupported_browser_does_not_register() {
        let browser = RefCell::new(Browser::default());
        let outcomes = load_until_settled(&browser, &CoiConfig::default());

        assert_eq!(outcomes, vec![Terminal::Unsupported]);
        let b = browser.borrow();
        assert_eq!(b.register_calls, 0);
        assert!(b.lines.iter().any(|line| line.starts_with("error:")));
    }

    #[test]
    fn test_registration_failure_is_terminal() {
        let browser = RefCell::new(Browser {
            registration_fails: true,
            ..Browser::working()
        });
        let outcomes = load_until_settled(&browser, &CoiConfig::default());

        assert_eq!(
            outcomes,
            vec![Terminal::Failed(CoordinatorError::RegistrationFailed(
                "SecurityError".to_string()
            ))]
        );
        assert_eq!(browser.borrow().reloads, 0);
    }

    #[test]
    fn test_redundant_worker_does_not_reload() {
        let browser = RefCell::new(Browser {
            worker_goes_redundant: true,
            ..Browser::working()
        });
        let outcomes = load_until_settled(&browser, &CoiConfig::default());

        assert_eq!(outcomes.len(), 1);
        assert!(matches!(
            outcomes[0],
            Terminal::Failed(CoordinatorError::ActivationFailed(_))
        ));
        assert_eq!(browser.borrow().reloads, 0);
    }

    #[test]
    fn test_disabled_registration() {
        let browser = RefCell::new(Browser::working());
        let config = CoiConfig {
            should_register: false,
            ..CoiConfig::default()
        };
        let outcomes = load_until_settled(&browser, &config);

        assert_eq!(outcomes, vec![Terminal::Disabled]);
        assert_eq!(browser.borrow().register_calls, 0);
    }

    #[test]
    fn test_deregistered_page_stays_unregistered() {
        // after deregistration the worker is gone and the clients were
        // navigated, so the next load has no registration and no controller
        let browser = RefCell::new(Browser {
            deregistered: true,
            ..Browser::working()
        });
        let outcomes = load_until_settled(&browser, &CoiConfig::default());

        assert_eq!(outcomes, vec![Terminal::Disabled]);
        let b = browser.borrow();
        assert_eq!(b.register_calls, 0);
        assert_eq!(b.reloads, 0);
        assert!(!b.registered);
    }

    #[test]
    fn test_failed_reload_is_not_counted() {
        let browser = RefCell::new(Browser {
            reload_fails: true,
            ..Browser::working()
        });
        let outcomes = load_until_settled(&browser, &CoiConfig::default());

        assert_eq!(
            outcomes,
            vec![Terminal::Failed(CoordinatorError::ReloadFailed(
                "navigation blocked".to_string()
            ))]
        );
        let b = browser.borrow();
        assert_eq!(b.session_reloads, 0);
        assert!(!b
            .lines
            .iter()
            .any(|line| line.contains("Reloading to activate threading")));
    }

    #[test]
    fn test_invalid_config_never_observes_the_page() {
        let browser = RefCell::new(Browser::working());
        let config = CoiConfig {
            scope: String::new(),
            ..CoiConfig::default()
        };
        let outcomes = load_until_settled(&browser, &config);

        assert!(matches!(
            outcomes[..],
            [Terminal::Failed(CoordinatorError::InvalidConfig(_))]
        ));
        assert_eq!(browser.borrow().register_calls, 0);
    }

    #[test]
    fn test_driver_reports_progress() {
        let browser = RefCell::new(Browser::working());
        load_until_settled(&browser, &CoiConfig::default());
        let b = browser.borrow();
        assert!(b.lines.iter().any(|line| line.contains("Service worker registered")));
        assert!(b.lines.iter().any(|line| line.contains("threading enabled")));
    }
}
