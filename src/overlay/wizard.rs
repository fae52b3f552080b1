//! Multi-step wizard state machine
//!
//! The engine knows nothing about the fields of any particular flow. Callers
//! supply a validity predicate for the current step on every guarded
//! transition, and the engine enforces the navigation rules centrally:
//!
//! - `next` moves to `current + 1` only when the current step is valid
//! - `prev` always moves back, never below step 1
//! - `go_to(n)` jumps back freely, and forward only to `current + 1` or to a
//!   step already completed, again only when the current step is valid
//!
//! The flow is complete when the current step is the last one; there is no
//! separate status flag.

use super::error::WizardError;
use super::stack::SharedRegistry;
use super::types::{EventSink, OverlayEvent, OverlayId};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// Field name to message map produced by step validation
pub type FieldErrors = BTreeMap<String, String>;

/// Data accumulated across wizard steps
pub trait StepData: Clone + Default {
    /// Data a session starts with when no seed is given
    fn empty() -> Self {
        Self::default()
    }

    /// Fold a partial update from one step into the accumulated data
    fn merge(&mut self, patch: Self);
}

impl StepData for Value {
    fn empty() -> Self {
        Value::Object(Map::new())
    }

    /// Objects merge key by key, recursively; anything else replaces.
    fn merge(&mut self, patch: Self) {
        match (self, patch) {
            (Value::Object(target), Value::Object(patch)) => {
                for (key, value) in patch {
                    match target.get_mut(&key) {
                        Some(existing) if existing.is_object() && value.is_object() => {
                            existing.merge(value);
                        }
                        _ => {
                            target.insert(key, value);
                        }
                    }
                }
            }
            (target, patch) => *target = patch,
        }
    }
}

/// Outcome of a step validity predicate
pub trait StepValidity {
    fn check(self) -> Result<(), FieldErrors>;
}

impl StepValidity for bool {
    fn check(self) -> Result<(), FieldErrors> {
        if self {
            Ok(())
        } else {
            Err(FieldErrors::new())
        }
    }
}

impl StepValidity for FieldErrors {
    fn check(self) -> Result<(), FieldErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

/// How a step should be drawn in a step indicator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Completed,
    Current,
    Upcoming,
}

/// Generic wizard engine
#[derive(Debug)]
pub struct WizardEngine<T: StepData> {
    id: OverlayId,
    total_steps: usize,
    current_step: usize,
    data: T,
    completed_steps: BTreeSet<usize>,
    is_open: bool,
    labels: Vec<String>,
    last_error: Option<String>,
    registry: Option<SharedRegistry>,
    priority: Option<i32>,
    events: EventSink,
}

impl<T: StepData> WizardEngine<T> {
    pub fn new(id: impl Into<OverlayId>, total_steps: usize) -> Result<Self, WizardError> {
        if total_steps == 0 {
            return Err(WizardError::NoSteps);
        }

        Ok(Self {
            id: id.into(),
            total_steps,
            current_step: 1,
            data: T::empty(),
            completed_steps: BTreeSet::new(),
            is_open: false,
            labels: Vec::new(),
            last_error: None,
            registry: None,
            priority: None,
            events: EventSink::default(),
        })
    }

    /// Attach display labels, one per step
    pub fn with_step_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels = labels.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_event_sender(mut self, sender: mpsc::UnboundedSender<OverlayEvent>) -> Self {
        self.events.set(sender);
        self
    }

    /// Join the overlay stack while open
    pub fn with_registry(mut self, registry: SharedRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Start a fresh session
    ///
    /// Resets to step 1 with `seed` (or empty data) whatever the previous
    /// session left behind. Pass the existing record as `seed` when editing.
    pub async fn open(&mut self, seed: Option<T>) {
        if let Some(registry) = &self.registry {
            self.priority = Some(registry.write().await.register(&self.id));
        }
        self.current_step = 1;
        self.data = seed.unwrap_or_else(T::empty);
        self.completed_steps.clear();
        self.last_error = None;
        self.is_open = true;

        info!("Wizard '{}' opened ({} steps)", self.id, self.total_steps);
        self.events.send(OverlayEvent::Opened {
            id: self.id.clone(),
        });
    }

    /// End the session; data stays readable until the next `open`
    pub async fn close(&mut self) {
        if !self.is_open {
            return;
        }
        self.is_open = false;
        self.priority = None;
        if let Some(registry) = &self.registry {
            registry.write().await.unregister(&self.id);
        }

        info!("Wizard '{}' closed at step {}", self.id, self.current_step);
        self.events.send(OverlayEvent::Closed {
            id: self.id.clone(),
        });
    }

    pub fn id(&self) -> &OverlayId {
        &self.id
    }

    pub fn is_open(&self) -> bool {
        self.is_open
    }

    /// Stack priority while open and registered
    pub fn priority(&self) -> Option<i32> {
        self.priority
    }

    pub fn current_step(&self) -> usize {
        self.current_step
    }

    pub fn total_steps(&self) -> usize {
        self.total_steps
    }

    pub fn data(&self) -> &T {
        &self.data
    }

    pub fn completed_steps(&self) -> &BTreeSet<usize> {
        &self.completed_steps
    }

    /// Error message from the last failed submission, if any
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn is_first_step(&self) -> bool {
        self.current_step == 1
    }

    pub fn is_last_step(&self) -> bool {
        self.current_step == self.total_steps
    }

    /// `current / total`; non-decreasing on a forward-only journey
    pub fn progress(&self) -> f64 {
        self.current_step as f64 / self.total_steps as f64
    }

    /// Share of steps that have been validated and left behind
    pub fn completion(&self) -> f64 {
        self.completed_steps.len() as f64 / self.total_steps as f64
    }

    pub fn step_label(&self, step: usize) -> Option<&str> {
        step.checked_sub(1)
            .and_then(|index| self.labels.get(index))
            .map(String::as_str)
    }

    /// e.g. "Step 2 of 5: Contacts"
    pub fn subtitle(&self) -> String {
        match self.step_label(self.current_step) {
            Some(label) => format!(
                "Step {} of {}: {}",
                self.current_step, self.total_steps, label
            ),
            None => format!("Step {} of {}", self.current_step, self.total_steps),
        }
    }

    pub fn step_status(&self, step: usize) -> StepStatus {
        if step == self.current_step {
            StepStatus::Current
        } else if self.completed_steps.contains(&step) {
            StepStatus::Completed
        } else {
            StepStatus::Upcoming
        }
    }

    /// Whether a step indicator should let the user click `step`
    ///
    /// Forward targets still need the current step to pass validation
    /// when [`go_to`](Self::go_to) is called.
    pub fn can_navigate_to(&self, step: usize) -> bool {
        (1..=self.total_steps).contains(&step)
            && (step <= self.current_step + 1 || self.completed_steps.contains(&step))
    }

    /// Merge a partial update into the accumulated data
    pub fn update_data(&mut self, patch: T) {
        self.data.merge(patch);
    }

    /// Advance one step if the current step is valid
    pub fn next<V, F>(&mut self, is_step_valid: F) -> Result<usize, WizardError>
    where
        V: StepValidity,
        F: FnOnce(usize, &T) -> V,
    {
        self.ensure_open()?;
        if self.is_last_step() {
            return Err(WizardError::AtLastStep(self.current_step));
        }

        self.validate_current(is_step_valid)?;
        self.completed_steps.insert(self.current_step);
        self.move_to(self.current_step + 1);
        Ok(self.current_step)
    }

    /// Step back; stays on step 1 when already there
    pub fn prev(&mut self) -> Result<usize, WizardError> {
        self.ensure_open()?;
        if self.current_step > 1 {
            self.move_to(self.current_step - 1);
        }
        Ok(self.current_step)
    }

    /// Jump to `step`
    ///
    /// Rejected jumps leave the wizard exactly as it was.
    pub fn go_to<V, F>(&mut self, step: usize, is_step_valid: F) -> Result<usize, WizardError>
    where
        V: StepValidity,
        F: FnOnce(usize, &T) -> V,
    {
        self.ensure_open()?;
        if !(1..=self.total_steps).contains(&step) {
            return Err(WizardError::StepOutOfRange {
                step,
                total: self.total_steps,
            });
        }

        if step <= self.current_step {
            self.move_to(step);
            return Ok(self.current_step);
        }

        if step != self.current_step + 1 && !self.completed_steps.contains(&step) {
            debug!(
                "Wizard '{}' refused jump from {} to unreached step {}",
                self.id, self.current_step, step
            );
            return Err(WizardError::StepLocked {
                step,
                current: self.current_step,
            });
        }

        self.validate_current(is_step_valid)?;
        self.completed_steps.insert(self.current_step);
        self.move_to(step);
        Ok(self.current_step)
    }

    /// Hand the accumulated data to `on_submit` from the last step
    ///
    /// On success every step is marked completed and the wizard closes. On
    /// failure the step, data and completed set are left untouched so the
    /// user can retry without re-entering anything.
    pub async fn submit<V, P, F, Fut>(
        &mut self,
        is_step_valid: P,
        on_submit: F,
    ) -> Result<(), WizardError>
    where
        V: StepValidity,
        P: FnOnce(usize, &T) -> V,
        F: FnOnce(T) -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        self.ensure_open()?;
        if !self.is_last_step() {
            return Err(WizardError::NotAtLastStep {
                current: self.current_step,
                total: self.total_steps,
            });
        }
        self.validate_current(is_step_valid)?;

        match on_submit(self.data.clone()).await {
            Ok(()) => {
                self.completed_steps.extend(1..=self.total_steps);
                self.last_error = None;
                info!("Wizard '{}' submitted", self.id);
                self.close().await;
                Ok(())
            }
            Err(err) => {
                error!("Wizard '{}' submission failed: {:#}", self.id, err);
                self.last_error = Some(format!("{err:#}"));
                Err(WizardError::SubmitFailed(err))
            }
        }
    }

    fn ensure_open(&self) -> Result<(), WizardError> {
        if self.is_open {
            Ok(())
        } else {
            Err(WizardError::NotOpen(self.id.clone()))
        }
    }

    fn validate_current<V, F>(&self, is_step_valid: F) -> Result<(), WizardError>
    where
        V: StepValidity,
        F: FnOnce(usize, &T) -> V,
    {
        is_step_valid(self.current_step, &self.data)
            .check()
            .map_err(|errors| {
                debug!(
                    "Wizard '{}' step {} blocked ({} field errors)",
                    self.id,
                    self.current_step,
                    errors.len()
                );
                WizardError::StepBlocked {
                    step: self.current_step,
                    errors,
                }
            })
    }

    fn move_to(&mut self, step: usize) {
        let from = self.current_step;
        if from == step {
            return;
        }
        self.current_step = step;

        debug!("Wizard '{}' step {} -> {}", self.id, from, step);
        self.events.send(OverlayEvent::StepChanged {
            id: self.id.clone(),
            from,
            to: step,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::stack::StackRegistry;
    use proptest::prelude::*;
    use serde_json::json;
    use std::sync::Arc;

    async fn opened(steps: usize) -> WizardEngine<Value> {
        let mut wizard = WizardEngine::new("vendor-onboarding", steps).unwrap();
        wizard.open(None).await;
        wizard
    }

    /// Opened wizard for synchronous tests
    fn wizard(steps: usize) -> WizardEngine<Value> {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(opened(steps))
    }

    fn always(_: usize, _: &Value) -> bool {
        true
    }

    #[test]
    fn test_zero_steps_rejected() {
        assert!(matches!(
            WizardEngine::<Value>::new("empty", 0),
            Err(WizardError::NoSteps)
        ));
    }

    #[test]
    fn test_next_is_gated_on_validity() {
        let mut wizard = wizard(3);
        let mut step_one_valid = false;

        let blocked = wizard.next(|_, _| step_one_valid);
        assert!(matches!(blocked, Err(WizardError::StepBlocked { step: 1, .. })));
        assert_eq!(wizard.current_step(), 1);

        step_one_valid = true;
        assert_eq!(wizard.next(|_, _| step_one_valid).unwrap(), 2);

        let step_two_valid = |step: usize, _: &Value| step != 2;
        let locked = wizard.go_to(3, step_two_valid);
        assert!(matches!(locked, Err(WizardError::StepBlocked { step: 2, .. })));
        assert_eq!(wizard.current_step(), 2);
    }

    #[test]
    fn test_go_to_rules() {
        let mut wizard = wizard(5);

        assert!(matches!(
            wizard.go_to(3, always),
            Err(WizardError::StepLocked { step: 3, current: 1 })
        ));
        assert!(matches!(
            wizard.go_to(6, always),
            Err(WizardError::StepOutOfRange { step: 6, total: 5 })
        ));
        assert!(matches!(
            wizard.go_to(0, always),
            Err(WizardError::StepOutOfRange { .. })
        ));

        wizard.next(always).unwrap();
        wizard.next(always).unwrap();
        wizard.next(always).unwrap();
        assert_eq!(wizard.current_step(), 4);

        // Back to a completed step, then forward again to another completed one.
        assert_eq!(wizard.go_to(1, |_, _| false).unwrap(), 1);
        assert_eq!(wizard.go_to(3, always).unwrap(), 3);

        // Step 4 was current but never validated, so it cannot be jumped to from 1.
        wizard.go_to(1, always).unwrap();
        assert!(matches!(
            wizard.go_to(4, always),
            Err(WizardError::StepLocked { step: 4, .. })
        ));
        assert_eq!(wizard.current_step(), 1);
    }

    #[test]
    fn test_prev_floors_at_one() {
        let mut wizard = wizard(3);
        assert_eq!(wizard.prev().unwrap(), 1);

        wizard.next(always).unwrap();
        assert_eq!(wizard.prev().unwrap(), 1);
        assert_eq!(wizard.prev().unwrap(), 1);
    }

    #[test]
    fn test_next_on_last_step() {
        let mut wizard = wizard(2);
        wizard.next(always).unwrap();
        assert!(matches!(wizard.next(always), Err(WizardError::AtLastStep(2))));
        assert!(wizard.is_last_step());
    }

    #[test]
    fn test_field_errors_are_surfaced() {
        let mut wizard = wizard(2);

        let result = wizard.next(|_, data: &Value| {
            let mut errors = FieldErrors::new();
            if data["companyInfo"]["companyName"].as_str().unwrap_or("").is_empty() {
                errors.insert("companyName".into(), "Company name is required".into());
            }
            errors
        });

        match result {
            Err(WizardError::StepBlocked { step, errors }) => {
                assert_eq!(step, 1);
                assert_eq!(errors["companyName"], "Company name is required");
            }
            other => panic!("expected blocked step, got {other:?}"),
        }

        wizard.update_data(json!({"companyInfo": {"companyName": "Acme"}}));
        assert_eq!(wizard.next(|_, _| FieldErrors::new()).unwrap(), 2);
    }

    #[test]
    fn test_data_survives_navigation() {
        let mut wizard = wizard(4);
        wizard.update_data(json!({"companyInfo": {"companyName": "Acme", "country": "US"}}));
        wizard.next(always).unwrap();
        wizard.update_data(json!({"contacts": [{"name": "Ann"}]}));
        wizard.next(always).unwrap();
        wizard.update_data(json!({"banking": {"routing": "021000021"}}));
        wizard.next(always).unwrap();
        assert_eq!(wizard.current_step(), 4);

        wizard.go_to(1, always).unwrap();
        wizard.update_data(json!({"companyInfo": {"country": "CA"}}));
        assert_eq!(wizard.go_to(3, always).unwrap(), 3);

        assert_eq!(
            wizard.data(),
            &json!({
                "companyInfo": {"companyName": "Acme", "country": "CA"},
                "contacts": [{"name": "Ann"}],
                "banking": {"routing": "021000021"}
            })
        );
    }

    #[tokio::test]
    async fn test_open_resets_previous_session() {
        let mut wizard = opened(3).await;
        wizard.update_data(json!({"leftover": true}));
        wizard.next(always).unwrap();
        wizard.next(always).unwrap();
        wizard.close().await;
        assert_eq!(wizard.data(), &json!({"leftover": true}));

        let seed = json!({"employee": {"firstName": "Sam"}});
        wizard.open(Some(seed.clone())).await;
        assert_eq!(wizard.current_step(), 1);
        assert_eq!(wizard.data(), &seed);
        assert!(wizard.completed_steps().is_empty());
        assert!((wizard.progress() - 1.0 / 3.0).abs() < f64::EPSILON);

        wizard.open(None).await;
        assert_eq!(wizard.data(), &json!({}));
    }

    #[test]
    fn test_navigation_requires_open() {
        let mut wizard = WizardEngine::<Value>::new("closed", 3).unwrap();
        assert!(matches!(wizard.next(always), Err(WizardError::NotOpen(_))));
        assert!(matches!(wizard.prev(), Err(WizardError::NotOpen(_))));
    }

    #[tokio::test]
    async fn test_labels_and_status() {
        let mut wizard = WizardEngine::<Value>::new("vendor", 3)
            .unwrap()
            .with_step_labels(["Company", "Contacts", "Review"]);
        wizard.open(None).await;
        assert_eq!(wizard.subtitle(), "Step 1 of 3: Company");

        wizard.next(always).unwrap();
        assert_eq!(wizard.step_status(1), StepStatus::Completed);
        assert_eq!(wizard.step_status(2), StepStatus::Current);
        assert_eq!(wizard.step_status(3), StepStatus::Upcoming);
        assert!(wizard.can_navigate_to(3));
        assert!(!wizard.can_navigate_to(4));
        assert_eq!(wizard.step_label(0), None);
    }

    #[tokio::test]
    async fn test_submit_failure_keeps_state() {
        let mut wizard = opened(2).await;
        wizard.update_data(json!({"name": "Acme"}));
        wizard.next(always).unwrap();

        let result = wizard
            .submit(always, |_| async { Err(anyhow::anyhow!("server unavailable")) })
            .await;
        assert!(matches!(result, Err(WizardError::SubmitFailed(_))));
        assert!(wizard.is_open());
        assert_eq!(wizard.current_step(), 2);
        assert_eq!(wizard.data(), &json!({"name": "Acme"}));
        assert_eq!(wizard.last_error(), Some("server unavailable"));

        let mut submitted = None;
        wizard
            .submit(always, |data| {
                submitted = Some(data);
                async { Ok(()) }
            })
            .await
            .unwrap();
        assert_eq!(submitted, Some(json!({"name": "Acme"})));
        assert!(!wizard.is_open());
        assert_eq!(wizard.completed_steps().len(), 2);
        assert_eq!(wizard.last_error(), None);
    }

    #[tokio::test]
    async fn test_submit_only_from_valid_last_step() {
        let mut wizard = opened(2).await;
        let early = wizard.submit(always, |_| async { Ok(()) }).await;
        assert!(matches!(
            early,
            Err(WizardError::NotAtLastStep { current: 1, total: 2 })
        ));

        wizard.next(always).unwrap();
        let invalid = wizard.submit(|_, _| false, |_| async { Ok(()) }).await;
        assert!(matches!(invalid, Err(WizardError::StepBlocked { step: 2, .. })));
        assert!(wizard.is_open());
    }

    #[tokio::test]
    async fn test_step_events() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut wizard = WizardEngine::<Value>::new("events", 3)
            .unwrap()
            .with_event_sender(tx);
        wizard.open(None).await;
        wizard.next(always).unwrap();
        wizard.prev().unwrap();

        let steps: Vec<(usize, usize)> = std::iter::from_fn(|| rx.try_recv().ok())
            .filter_map(|event| match event {
                OverlayEvent::StepChanged { from, to, .. } => Some((from, to)),
                _ => None,
            })
            .collect();
        assert_eq!(steps, vec![(1, 2), (2, 1)]);
    }

    #[tokio::test]
    async fn test_registered_wizard_leaves_stack_on_submit() {
        let registry = StackRegistry::new().shared();
        let mut wizard = WizardEngine::<Value>::new("onboarding", 1)
            .unwrap()
            .with_registry(Arc::clone(&registry));

        wizard.open(None).await;
        assert_eq!(wizard.priority(), Some(50));
        assert!(registry.read().await.is_scroll_locked());

        wizard.submit(always, |_| async { Ok(()) }).await.unwrap();
        assert!(!wizard.is_open());
        assert_eq!(wizard.priority(), None);
        assert!(registry.read().await.is_empty());
        assert!(!registry.read().await.is_scroll_locked());
    }

    #[tokio::test]
    async fn test_failed_submit_keeps_stack_place() {
        let registry = StackRegistry::new().shared();
        let mut wizard = WizardEngine::<Value>::new("onboarding", 1)
            .unwrap()
            .with_registry(Arc::clone(&registry));
        wizard.open(None).await;

        let _ = wizard
            .submit(always, |_| async { Err(anyhow::anyhow!("timeout")) })
            .await;
        assert!(registry.read().await.is_topmost(wizard.id()));
    }

    #[derive(Debug, Clone)]
    enum Nav {
        Next(bool),
        Prev,
        GoTo(usize, bool),
    }

    fn nav_strategy() -> impl Strategy<Value = Nav> {
        prop_oneof![
            any::<bool>().prop_map(Nav::Next),
            Just(Nav::Prev),
            (0usize..8, any::<bool>()).prop_map(|(step, valid)| Nav::GoTo(step, valid)),
        ]
    }

    proptest! {
        #[test]
        fn prop_go_to_matches_rule(navs in prop::collection::vec(nav_strategy(), 0..40), target in 1usize..=6) {
            let mut wizard = wizard(6);
            for nav in navs {
                let _ = match nav {
                    Nav::Next(valid) => wizard.next(|_, _| valid),
                    Nav::Prev => wizard.prev(),
                    Nav::GoTo(step, valid) => wizard.go_to(step, |_, _| valid),
                };
            }

            let current = wizard.current_step();
            let completed = wizard.completed_steps().clone();
            let allowed = target <= current + 1 || completed.contains(&target);

            let result = wizard.go_to(target, always);
            prop_assert_eq!(result.is_ok(), allowed);
            if allowed {
                prop_assert_eq!(wizard.current_step(), target);
            } else {
                prop_assert_eq!(wizard.current_step(), current);
                prop_assert_eq!(wizard.completed_steps(), &completed);
            }
        }

        #[test]
        fn prop_completed_only_grows_while_open(valid in prop::collection::vec(any::<bool>(), 0..20)) {
            let mut wizard = wizard(5);
            let mut previous = wizard.completed_steps().clone();
            let mut last_progress = wizard.progress();

            for ok in valid {
                let _ = wizard.next(|_, _| ok);
                prop_assert!(previous.is_subset(wizard.completed_steps()));
                prop_assert!(wizard.progress() >= last_progress);
                previous = wizard.completed_steps().clone();
                last_progress = wizard.progress();
            }
        }
    }
}
