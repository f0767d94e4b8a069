//! Check-In Resolver.
//!
//! Resolving a scan happens in two phases:
//!
//! 1. **Plan** (no writes): trim and decode the input, reject tokens for
//!    another workshop, and resolve carried identities through the
//!    [`IdentityDirectory`]. Every rejection that can be decided here is.
//! 2. **Execute** (one unit of work): lock the workshop, locate or create the
//!    registration, apply the guarded `attended` transition and any counter
//!    effect, then commit. The whole phase is retried on transient storage
//!    failures; each attempt re-reads current state.
//!
//! Re-scanning an attended registration is reported as
//! [`CheckInOutcome::AlreadyCheckedIn`], carrying the original `attended_at`.

use std::time::Instant;

use checkin_core::capacity::{CapacityEffect, CapacityLedger};
use checkin_core::error::{CheckInError, Result};
use checkin_core::lifecycle::{self, Transition};
use checkin_core::store::{CheckInStore, IdentityDirectory, UnitOfWork};
use checkin_core::token::{self, DecodedToken, TokenFormat};
use checkin_core::types::{
    AttendanceMethod, CheckInResult, Holder, HolderIdentity, NewRegistration, OperatorId,
    Registration, RegistrationCode, RegistrationId, RegistrationStatus, RegistrationView, Workshop,
    WorkshopId,
};
use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::metrics::{REGISTRATIONS_CREATED_TOTAL, RESOLVE_DURATION_SECONDS, SCANS_TOTAL};
use crate::retry::retry_storage;
use crate::{CheckInService, WalkInPolicy};

const AUTO_REGISTERED_NOTE: &str = "auto-registered via QR scan";
const WALK_IN_NOTE: &str = "walk-in registration";

/// How a successful check-in found its registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CheckInPath {
    /// An existing registration moved to `attended`.
    Existing,
    /// A known person without a registration was registered on the spot.
    AutoRegistered,
    /// An unmatched scan created an anonymous walk-in.
    WalkIn,
}

impl CheckInPath {
    /// Stable label for logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Existing => "existing",
            Self::AutoRegistered => "auto_registered",
            Self::WalkIn => "walk_in",
        }
    }
}

/// Result of a resolved scan.
#[derive(Clone, Debug, PartialEq)]
pub enum CheckInOutcome {
    /// This call marked the registration attended.
    CheckedIn {
        /// The registration as committed
        registration: Registration,
        /// How it was found or created
        path: CheckInPath,
    },
    /// The registration was already attended; nothing changed.
    AlreadyCheckedIn {
        /// The registration as stored, with its original `attended_at`
        registration: Registration,
    },
}

impl CheckInOutcome {
    /// The registration involved.
    #[must_use]
    pub const fn registration(&self) -> &Registration {
        match self {
            Self::CheckedIn { registration, .. } | Self::AlreadyCheckedIn { registration } => {
                registration
            }
        }
    }

    /// Whether this call changed state.
    #[must_use]
    pub const fn is_checked_in(&self) -> bool {
        matches!(self, Self::CheckedIn { .. })
    }

    /// Metrics label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::CheckedIn { path, .. } => path.as_str(),
            Self::AlreadyCheckedIn { .. } => "already_checked_in",
        }
    }
}

/// A resolved scan with its caller-facing projection.
#[derive(Clone, Debug, PartialEq)]
pub struct Resolution {
    /// What happened
    pub outcome: CheckInOutcome,
    /// Projection of the registration involved
    pub view: RegistrationView,
}

/// What to do once the workshop is locked.
#[derive(Clone, Debug)]
enum Plan {
    /// Known person: attend their live registration, or auto-register.
    Holder {
        person: HolderIdentity,
        format: TokenFormat,
    },
    /// Registration reference without an identity.
    Reference { id: RegistrationId },
    /// Legacy token: by registration id, falling back to the carried code.
    Legacy {
        id: RegistrationId,
        code: RegistrationCode,
    },
    /// Delimited pair naming a known person. Without a live registration the
    /// raw input takes the literal path.
    Pair {
        person: HolderIdentity,
        literal: String,
    },
    /// Match against stored codes, else walk-in.
    Literal { input: String },
}

impl Plan {
    const fn label(&self) -> &'static str {
        match self {
            Self::Holder { .. } => "holder",
            Self::Reference { .. } => "reference",
            Self::Legacy { .. } => "legacy",
            Self::Pair { .. } => "pair",
            Self::Literal { .. } => "literal",
        }
    }
}

impl<S, D> CheckInService<S, D>
where
    S: CheckInStore,
    D: IdentityDirectory,
{
    /// Resolve a scan and mark the registration attended.
    ///
    /// Never fails: rejections and storage failures are reported in the
    /// returned [`CheckInResult`] with `success == false`. Storage failures
    /// get a generic message and are logged.
    #[tracing::instrument(skip(self, raw_input), name = "resolve_and_check_in")]
    pub async fn resolve_and_check_in(
        &self,
        raw_input: &str,
        workshop_id: WorkshopId,
        operator: OperatorId,
    ) -> CheckInResult {
        let started = Instant::now();
        let result = self.resolve(raw_input, workshop_id, operator).await;
        metrics::histogram!(RESOLVE_DURATION_SECONDS).record(started.elapsed().as_secs_f64());

        let (label, summary) = match result {
            Ok(resolution) => (resolution.outcome.label(), summarize(resolution)),
            Err(err) if err.is_rejection() => {
                warn!(workshop_id = %workshop_id, error = %err, "Scan rejected");
                (
                    "rejected",
                    CheckInResult {
                        success: false,
                        message: err.to_string(),
                        registration_view: None,
                    },
                )
            }
            Err(err) => {
                error!(workshop_id = %workshop_id, error = %err, "Check-in failed");
                (
                    "failed",
                    CheckInResult {
                        success: false,
                        message: "Check-in could not be saved, please try again".to_string(),
                        registration_view: None,
                    },
                )
            }
        };

        metrics::counter!(SCANS_TOTAL, "outcome" => label).increment(1);
        summary
    }

    /// Resolve a scan and mark the registration attended, returning the
    /// typed outcome.
    ///
    /// # Errors
    ///
    /// - Rejections ([`CheckInError::is_rejection`]) when the scan cannot be
    ///   accepted; nothing is written
    /// - [`CheckInError::Storage`] or [`CheckInError::Conflict`] when the unit
    ///   of work could not commit after retries; nothing is written
    pub async fn resolve(
        &self,
        raw_input: &str,
        workshop_id: WorkshopId,
        operator: OperatorId,
    ) -> Result<Resolution> {
        let input = raw_input.trim();
        if input.is_empty() {
            return Err(CheckInError::EmptyInput);
        }

        let plan = self.plan(input, workshop_id).await?;
        debug!(plan = plan.label(), "Scan decoded");

        let (outcome, workshop) = retry_storage(&self.config.retry, "check_in", || {
            self.execute(&plan, workshop_id, operator)
        })
        .await?;

        match &outcome {
            CheckInOutcome::CheckedIn { registration, path } => {
                info!(
                    registration_id = %registration.id,
                    code = %registration.code,
                    path = path.as_str(),
                    "Checked in"
                );
                if *path != CheckInPath::Existing {
                    metrics::counter!(REGISTRATIONS_CREATED_TOTAL, "path" => path.as_str()).increment(1);
                }
            }
            CheckInOutcome::AlreadyCheckedIn { registration } => {
                info!(registration_id = %registration.id, "Already checked in");
            }
        }

        let holder = self.holder_identity(outcome.registration()).await;
        let view = RegistrationView::new(outcome.registration(), &workshop, holder.as_ref());
        Ok(Resolution { outcome, view })
    }

    // ========================================================================
    // Planning
    // ========================================================================

    async fn plan(&self, input: &str, workshop_id: WorkshopId) -> Result<Plan> {
        let Some(decoded) = token::decode(input) else {
            return Ok(Plan::Literal {
                input: input.to_string(),
            });
        };

        let found = decoded.workshop_id();
        if found != workshop_id {
            return Err(CheckInError::WrongWorkshop {
                expected: workshop_id,
                found,
            });
        }

        let format = decoded.format();
        match decoded {
            DecodedToken::Structured(t) => {
                self.plan_identity(t.identity, t.registration_id, format).await
            }
            DecodedToken::FieldComposed(t) => {
                self.plan_identity(Some(t.identity), t.registration_id, format).await
            }
            DecodedToken::Legacy(t) => Ok(Plan::Legacy {
                id: t.registration_id,
                code: t.code,
            }),
            DecodedToken::DelimitedPair(t) => {
                Ok(match self.directory.find_by_identity(&t.identity).await? {
                    Some(person) => Plan::Pair {
                        person,
                        literal: input.to_string(),
                    },
                    None => Plan::Literal {
                        input: input.to_string(),
                    },
                })
            }
        }
    }

    async fn plan_identity(
        &self,
        identity: Option<String>,
        reference: Option<RegistrationId>,
        format: TokenFormat,
    ) -> Result<Plan> {
        match (identity, reference) {
            (Some(identity), _) => match self.directory.find_by_identity(&identity).await? {
                Some(person) => Ok(Plan::Holder { person, format }),
                None => Err(CheckInError::UnknownHolder { identity }),
            },
            (None, Some(id)) => Ok(Plan::Reference { id }),
            (None, None) => Err(CheckInError::UnknownHolder {
                identity: "(none)".to_string(),
            }),
        }
    }

    // ========================================================================
    // Execution
    // ========================================================================

    async fn execute(
        &self,
        plan: &Plan,
        workshop_id: WorkshopId,
        operator: OperatorId,
    ) -> Result<(CheckInOutcome, Workshop)> {
        let at = self.clock.now();
        let mut unit = self.store.begin(workshop_id).await?;

        let outcome = match plan {
            Plan::Holder { person, format } => {
                self.check_in_person(&mut unit, person, *format, at, operator)
                    .await?
            }
            Plan::Reference { id } => {
                let registration = unit
                    .find_by_id(*id)
                    .await?
                    .ok_or(CheckInError::RegistrationNotFound)?;
                ensure_workshop(&registration, workshop_id)?;
                attend(&mut unit, registration, at, operator).await?
            }
            Plan::Legacy { id, code } => {
                let registration = match unit.find_by_id(*id).await? {
                    Some(registration) if registration.workshop_id == workshop_id => registration,
                    _ => unit
                        .find_by_code(code)
                        .await?
                        .ok_or(CheckInError::RegistrationNotFound)?,
                };
                ensure_workshop(&registration, workshop_id)?;
                attend(&mut unit, registration, at, operator).await?
            }
            Plan::Pair { person, literal } => match unit.find_live_by_user(person.user_id).await? {
                Some(registration) => attend(&mut unit, registration, at, operator).await?,
                None => self.check_in_literal(&mut unit, literal, at, operator).await?,
            },
            Plan::Literal { input } => self.check_in_literal(&mut unit, input, at, operator).await?,
        };

        let workshop = unit.workshop().clone();
        unit.commit().await?;
        Ok((outcome, workshop))
    }

    async fn check_in_person<U: UnitOfWork>(
        &self,
        unit: &mut U,
        person: &HolderIdentity,
        format: TokenFormat,
        at: DateTime<Utc>,
        operator: OperatorId,
    ) -> Result<CheckInOutcome> {
        if let Some(existing) = unit.find_live_by_user(person.user_id).await? {
            return attend(unit, existing, at, operator).await;
        }

        let code = self.config.codes.generate_unique(unit).await?;
        let registration = lifecycle::created_attended(
            unit.workshop().id,
            Holder::User {
                user_id: person.user_id,
            },
            code,
            at,
            AttendanceMethod::QrScan,
            operator,
            AUTO_REGISTERED_NOTE,
            json!({ "source": format.as_str() }),
        );
        create(unit, registration, CheckInPath::AutoRegistered).await
    }

    async fn check_in_literal<U: UnitOfWork>(
        &self,
        unit: &mut U,
        input: &str,
        at: DateTime<Utc>,
        operator: OperatorId,
    ) -> Result<CheckInOutcome> {
        let candidate = RegistrationCode::new(input);
        if let Some(existing) = unit.find_by_code(&candidate).await? {
            ensure_workshop(&existing, unit.workshop().id)?;
            return attend(unit, existing, at, operator).await;
        }

        if self.config.walk_in_policy == WalkInPolicy::Reject {
            return Err(CheckInError::WalkInNotAllowed {
                input: input.to_string(),
            });
        }

        // A code-shaped scan keeps its value so scanning it again finds
        // this walk-in instead of creating another.
        let (code, method, data) = if candidate.is_code_shaped() {
            (candidate, AttendanceMethod::BarcodeScan, json!({ "source": "walk_in" }))
        } else {
            let code = self.config.codes.generate_unique(unit).await?;
            (
                code,
                AttendanceMethod::Manual,
                json!({ "source": "walk_in", "input": input }),
            )
        };

        let registration = lifecycle::created_attended(
            unit.workshop().id,
            Holder::WalkIn {
                attributed_to: operator,
            },
            code,
            at,
            method,
            operator,
            WALK_IN_NOTE,
            data,
        );
        create(unit, registration, CheckInPath::WalkIn).await
    }

    async fn holder_identity(&self, registration: &Registration) -> Option<HolderIdentity> {
        let user_id = registration.holder.user_id()?;
        match self.directory.find_by_id(user_id).await {
            Ok(holder) => holder,
            Err(err) => {
                warn!(user_id = %user_id, error = %err, "Holder lookup failed after commit");
                None
            }
        }
    }
}

fn ensure_workshop(registration: &Registration, workshop_id: WorkshopId) -> Result<()> {
    if registration.workshop_id == workshop_id {
        Ok(())
    } else {
        Err(CheckInError::WrongWorkshop {
            expected: workshop_id,
            found: registration.workshop_id,
        })
    }
}

/// Move an existing registration to `attended` with a conditional update.
async fn attend<U: UnitOfWork>(
    unit: &mut U,
    registration: Registration,
    at: DateTime<Utc>,
    operator: OperatorId,
) -> Result<CheckInOutcome> {
    if registration.is_attended() {
        return Ok(CheckInOutcome::AlreadyCheckedIn { registration });
    }

    let transition = Transition::Attend {
        at,
        method: AttendanceMethod::QrScan,
        by: operator,
    };
    let mut updated = registration.clone();
    let effect = lifecycle::apply(&mut updated, transition)?;

    if !unit.update_if(&updated, transition.allowed_from()).await? {
        // Another writer got there first; report what is stored now.
        let current = unit
            .find_by_id(registration.id)
            .await?
            .ok_or(CheckInError::RegistrationNotFound)?;
        if current.is_attended() {
            return Ok(CheckInOutcome::AlreadyCheckedIn {
                registration: current,
            });
        }
        return Err(CheckInError::InvalidTransition {
            from: current.status,
            to: RegistrationStatus::Attended,
        });
    }

    if effect != CapacityEffect::None {
        unit.apply_capacity(effect).await?;
    }

    Ok(CheckInOutcome::CheckedIn {
        registration: updated,
        path: CheckInPath::Existing,
    })
}

/// Insert a registration created at check-in time and consume its slot.
async fn create<U: UnitOfWork>(
    unit: &mut U,
    registration: NewRegistration,
    path: CheckInPath,
) -> Result<CheckInOutcome> {
    let registration = unit.insert(registration).await?;
    unit.apply_capacity(CapacityLedger::on_registration_created())
        .await?;
    Ok(CheckInOutcome::CheckedIn { registration, path })
}

fn summarize(resolution: Resolution) -> CheckInResult {
    let Resolution { outcome, view } = resolution;
    let who = view
        .holder_name
        .clone()
        .unwrap_or_else(|| format!("Code {}", view.code));

    let message = match &outcome {
        CheckInOutcome::CheckedIn {
            path: CheckInPath::Existing,
            ..
        } => format!("{who} checked in to {}", view.workshop_title),
        CheckInOutcome::CheckedIn {
            path: CheckInPath::AutoRegistered,
            ..
        } => format!("{who} registered and checked in to {}", view.workshop_title),
        CheckInOutcome::CheckedIn {
            path: CheckInPath::WalkIn,
            ..
        } => format!(
            "Walk-in checked in to {} with code {}",
            view.workshop_title, view.code
        ),
        CheckInOutcome::AlreadyCheckedIn { registration } => match registration.attended_at {
            Some(at) => format!(
                "{who} already checked in at {}",
                at.format("%Y-%m-%d %H:%M:%S UTC")
            ),
            None => format!("{who} already checked in"),
        },
    };

    CheckInResult {
        success: outcome.is_checked_in(),
        message,
        registration_view: Some(view),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use checkin_core::code::CodeRegistry;
    use checkin_core::types::UserId;
    use checkin_testing::{fixtures, test_epoch};
    use chrono::Duration;

    /// Unit whose conditional update always loses to a concurrent writer that
    /// left `stored` behind.
    struct LosingUnit {
        workshop: Workshop,
        stored: Registration,
        effects: Vec<CapacityEffect>,
    }

    impl CodeRegistry for LosingUnit {
        async fn code_exists(&mut self, _code: &RegistrationCode) -> Result<bool> {
            Ok(false)
        }
    }

    impl UnitOfWork for LosingUnit {
        fn workshop(&self) -> &Workshop {
            &self.workshop
        }

        async fn find_by_id(&mut self, id: RegistrationId) -> Result<Option<Registration>> {
            Ok((id == self.stored.id).then(|| self.stored.clone()))
        }

        async fn find_by_code(&mut self, _code: &RegistrationCode) -> Result<Option<Registration>> {
            Ok(None)
        }

        async fn find_live_by_user(&mut self, _user_id: UserId) -> Result<Option<Registration>> {
            Ok(None)
        }

        async fn insert(&mut self, _registration: NewRegistration) -> Result<Registration> {
            Err(CheckInError::Storage("insert not expected".into()))
        }

        async fn update_if(
            &mut self,
            _registration: &Registration,
            _expected: &[RegistrationStatus],
        ) -> Result<bool> {
            Ok(false)
        }

        async fn apply_capacity(&mut self, effect: CapacityEffect) -> Result<()> {
            self.effects.push(effect);
            Ok(())
        }

        async fn commit(self) -> Result<()> {
            Ok(())
        }
    }

    fn registered() -> Registration {
        lifecycle::sign_up(
            WorkshopId::new(7),
            UserId::new(1),
            RegistrationCode::new("RACE2345"),
            test_epoch(),
        )
        .into_registration(RegistrationId::new(12))
    }

    fn losing_unit(stored: Registration) -> LosingUnit {
        LosingUnit {
            workshop: fixtures::workshop(7, None),
            stored,
            effects: Vec::new(),
        }
    }

    #[tokio::test]
    async fn lost_update_reports_the_concurrent_check_in() {
        let earlier = test_epoch() - Duration::minutes(3);
        let mut stored = registered();
        lifecycle::apply(
            &mut stored,
            Transition::Attend {
                at: earlier,
                method: AttendanceMethod::QrScan,
                by: fixtures::operator(),
            },
        )
        .unwrap();
        let mut unit = losing_unit(stored);

        let outcome = attend(&mut unit, registered(), test_epoch(), fixtures::operator())
            .await
            .unwrap();

        let CheckInOutcome::AlreadyCheckedIn { registration } = outcome else {
            panic!("expected AlreadyCheckedIn, got {outcome:?}");
        };
        assert_eq!(registration.attended_at, Some(earlier));
        assert!(unit.effects.is_empty());
    }

    #[tokio::test]
    async fn lost_update_to_a_cancellation_is_an_invalid_transition() {
        let mut stored = registered();
        lifecycle::apply(&mut stored, Transition::Cancel { by: None }).unwrap();
        let mut unit = losing_unit(stored);

        let result = attend(&mut unit, registered(), test_epoch(), fixtures::operator()).await;

        assert_eq!(
            result,
            Err(CheckInError::InvalidTransition {
                from: RegistrationStatus::Cancelled,
                to: RegistrationStatus::Attended,
            })
        );
        assert!(unit.effects.is_empty());
    }
}
