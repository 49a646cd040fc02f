//! The boost state machine.
//!
//! ```text
//! pending ──approve──► active ──expire──► expired
//!    │                   │
//!    ├──reject──► rejected
//!    └──cancel──┬────────┘
//!               ├──► cancelled_by_user
//!               └──► cancelled_by_admin
//! ```
//!
//! Planning a transition is pure: it reads a boost and yields the fields to
//! write, or an error. Nothing here touches the store; writes go through
//! [`BoostStore::update_boost_transition`](super::db::BoostStore::update_boost_transition),
//! which only succeeds if the boost's version is unchanged since it was read.

use chrono::{DateTime, Utc};

use crate::error::Error;

use super::cost::{compute_end_date, require_reason};
use super::{Approval, Boost, BoostEvent, BoostStatus, CancelActor, Resolution};

#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    Approve {
        by: String,
    },
    Reject {
        by: String,
        reason: Option<String>,
    },
    Cancel {
        by: String,
        reason: Option<String>,
        actor: CancelActor,
    },
    Expire,
}

impl Command {
    pub fn event(&self) -> BoostEvent {
        match self {
            Command::Approve { .. } => BoostEvent::Approve,
            Command::Reject { .. } => BoostEvent::Reject,
            Command::Cancel { .. } => BoostEvent::Cancel,
            Command::Expire => BoostEvent::Expire,
        }
    }
}

/// The complete set of fields a transition writes. They are always written
/// together, along with a version increment.
#[derive(Clone, Debug, PartialEq)]
pub struct Transition {
    pub status: BoostStatus,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub approval: Option<Approval>,
    pub resolution: Option<Resolution>,
    pub modified_at: DateTime<Utc>,
}

impl Transition {
    fn unchanged(boost: &Boost, now: DateTime<Utc>) -> Transition {
        Transition {
            status: boost.status,
            start_date: boost.start_date,
            end_date: boost.end_date,
            approval: boost.approval.clone(),
            resolution: boost.resolution.clone(),
            modified_at: now,
        }
    }

    pub fn apply(self, boost: &mut Boost) {
        boost.status = self.status;
        boost.start_date = self.start_date;
        boost.end_date = self.end_date;
        boost.approval = self.approval;
        boost.resolution = self.resolution;
        boost.modified_at = self.modified_at;
        boost.version += 1;
    }
}

pub fn plan(boost: &Boost, command: Command, now: DateTime<Utc>) -> Result<Transition, Error> {
    let event = command.event();
    let invalid = || Error::InvalidTransition {
        boost_id: boost.id,
        status: boost.status,
        event,
    };

    let mut transition = Transition::unchanged(boost, now);
    match (boost.status, command) {
        (BoostStatus::Pending, Command::Approve { by }) => {
            let start_date = boost.start_date.unwrap_or(now);
            transition.status = BoostStatus::Active;
            transition.start_date = Some(start_date);
            transition.end_date = Some(compute_end_date(start_date, boost.duration_days)?);
            transition.approval = Some(Approval { by, at: now });
        }
        (BoostStatus::Pending, Command::Reject { by, reason }) => {
            let reason = require_reason(boost.id, reason)?;
            transition.status = BoostStatus::Rejected;
            transition.resolution = Some(Resolution::Rejected {
                by,
                at: now,
                reason,
            });
        }
        (BoostStatus::Pending | BoostStatus::Active, Command::Cancel { by, reason, actor }) => {
            let (status, reason) = match actor {
                CancelActor::Admin => (
                    BoostStatus::CancelledByAdmin,
                    Some(require_reason(boost.id, reason)?),
                ),
                CancelActor::User => (
                    BoostStatus::CancelledByUser,
                    reason
                        .map(|reason| reason.trim().to_string())
                        .filter(|reason| !reason.is_empty()),
                ),
            };
            transition.status = status;
            transition.resolution = Some(Resolution::Cancelled {
                by,
                at: now,
                reason,
                actor,
            });
        }
        (BoostStatus::Active, Command::Expire) => {
            match boost.end_date {
                Some(end_date) if end_date <= now => {}
                end_date => {
                    return Err(Error::BoostHasNotEnded {
                        boost_id: boost.id,
                        end_date,
                    })
                }
            }
            transition.status = BoostStatus::Expired;
            transition.resolution = Some(Resolution::Expired { at: now });
        }
        _ => return Err(invalid()),
    }

    Ok(transition)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::boost::BoostId;
    use crate::provider::ProviderId;
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;
    use rust_decimal::Decimal;

    pub(crate) fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    pub(crate) fn pending_boost(duration_days: i32) -> Boost {
        Boost {
            id: BoostId::new(),
            provider_id: ProviderId::new(),
            categories: vec!["vedic".to_string()],
            duration_days,
            start_date: None,
            end_date: None,
            daily_cost: Decimal::from(500),
            total_cost: Decimal::from(500 * duration_days),
            status: BoostStatus::Pending,
            created_by_admin: true,
            created_by: "admin1".to_string(),
            approval: None,
            resolution: None,
            created_at: t0(),
            modified_at: t0(),
            version: 0,
        }
    }

    fn run(boost: &Boost, command: Command, now: DateTime<Utc>) -> Result<Boost, Error> {
        let transition = plan(boost, command, now)?;
        let mut boost = boost.clone();
        transition.apply(&mut boost);
        boost.check_invariants()?;
        Ok(boost)
    }

    fn approve() -> Command {
        Command::Approve {
            by: "admin1".to_string(),
        }
    }

    #[test]
    fn approve_defaults_start_to_now() {
        let boost = run(&pending_boost(7), approve(), t0()).unwrap();

        assert_eq!(boost.status, BoostStatus::Active);
        assert_eq!(boost.start_date, Some(t0()));
        assert_eq!(boost.end_date, Some(t0() + Duration::days(7)));
        assert_eq!(
            boost.approval,
            Some(Approval {
                by: "admin1".to_string(),
                at: t0()
            })
        );
        assert_eq!(boost.version, 1);
    }

    #[test]
    fn approve_keeps_requested_start() {
        let start = t0() + Duration::days(2);
        let mut boost = pending_boost(3);
        boost.start_date = Some(start);
        boost.end_date = Some(start + Duration::days(3));

        let boost = run(&boost, approve(), t0()).unwrap();

        assert_eq!(boost.start_date, Some(start));
        assert_eq!(boost.end_date, Some(start + Duration::days(3)));
    }

    #[test]
    fn reject_requires_reason() {
        let boost = pending_boost(7);

        let result = plan(
            &boost,
            Command::Reject {
                by: "admin1".to_string(),
                reason: Some("".to_string()),
            },
            t0(),
        );

        assert_eq!(
            result.unwrap_err(),
            Error::MissingReason { boost_id: boost.id }
        );
    }

    #[test]
    fn reject_records_resolution() {
        let boost = run(
            &pending_boost(7),
            Command::Reject {
                by: "admin2".to_string(),
                reason: Some("blurry photo".to_string()),
            },
            t0(),
        )
        .unwrap();

        assert_eq!(boost.status, BoostStatus::Rejected);
        assert_eq!(
            boost.resolution,
            Some(Resolution::Rejected {
                by: "admin2".to_string(),
                at: t0(),
                reason: "blurry photo".to_string()
            })
        );
    }

    #[test]
    fn cannot_reject_an_active_boost() {
        let active = run(&pending_boost(7), approve(), t0()).unwrap();

        let result = plan(
            &active,
            Command::Reject {
                by: "admin1".to_string(),
                reason: Some("late".to_string()),
            },
            t0(),
        );

        assert_eq!(
            result.unwrap_err(),
            Error::InvalidTransition {
                boost_id: active.id,
                status: BoostStatus::Active,
                event: BoostEvent::Reject
            }
        );
    }

    #[test]
    fn admin_cancel_requires_reason_but_user_cancel_does_not() {
        let active = run(&pending_boost(7), approve(), t0()).unwrap();

        let admin = plan(
            &active,
            Command::Cancel {
                by: "admin1".to_string(),
                reason: None,
                actor: CancelActor::Admin,
            },
            t0(),
        );
        assert_eq!(
            admin.unwrap_err(),
            Error::MissingReason {
                boost_id: active.id
            }
        );

        let user = run(
            &active,
            Command::Cancel {
                by: "provider".to_string(),
                reason: None,
                actor: CancelActor::User,
            },
            t0(),
        )
        .unwrap();
        assert_eq!(user.status, BoostStatus::CancelledByUser);
        assert_eq!(
            user.resolution,
            Some(Resolution::Cancelled {
                by: "provider".to_string(),
                at: t0(),
                reason: None,
                actor: CancelActor::User
            })
        );
    }

    #[test]
    fn pending_boost_can_be_cancelled() {
        let boost = run(
            &pending_boost(7),
            Command::Cancel {
                by: "admin1".to_string(),
                reason: Some("duplicate".to_string()),
                actor: CancelActor::Admin,
            },
            t0(),
        )
        .unwrap();

        assert_eq!(boost.status, BoostStatus::CancelledByAdmin);
    }

    #[test]
    fn expire_fires_exactly_at_end_date() {
        let active = run(&pending_boost(7), approve(), t0()).unwrap();
        let end = t0() + Duration::days(7);

        let early = plan(&active, Command::Expire, end - Duration::seconds(1));
        assert_eq!(
            early.unwrap_err(),
            Error::BoostHasNotEnded {
                boost_id: active.id,
                end_date: Some(end)
            }
        );

        let expired = run(&active, Command::Expire, end).unwrap();
        assert_eq!(expired.status, BoostStatus::Expired);
        assert_eq!(expired.resolution, Some(Resolution::Expired { at: end }));
    }

    #[test]
    fn pending_boost_cannot_expire() {
        let boost = pending_boost(1);

        let result = plan(&boost, Command::Expire, t0() + Duration::days(40));

        assert_eq!(
            result.unwrap_err(),
            Error::InvalidTransition {
                boost_id: boost.id,
                status: BoostStatus::Pending,
                event: BoostEvent::Expire
            }
        );
    }

    fn arb_reason() -> impl Strategy<Value = Option<String>> {
        proptest::option::of("[a-z ]{0,12}")
    }

    fn arb_command() -> impl Strategy<Value = Command> {
        prop_oneof![
            Just(approve()),
            arb_reason().prop_map(|reason| Command::Reject {
                by: "admin1".to_string(),
                reason
            }),
            (arb_reason(), prop_oneof![Just(CancelActor::User), Just(CancelActor::Admin)]).prop_map(
                |(reason, actor)| Command::Cancel {
                    by: "admin1".to_string(),
                    reason,
                    actor
                }
            ),
            Just(Command::Expire),
        ]
    }

    fn arb_terminal_boost() -> impl Strategy<Value = Boost> {
        (0usize..4).prop_map(|kind| {
            let active = run(&pending_boost(5), approve(), t0()).unwrap();
            let command = match kind {
                0 => return run(&active, Command::Expire, t0() + Duration::days(5)).unwrap(),
                1 => {
                    return run(
                        &pending_boost(5),
                        Command::Reject {
                            by: "admin1".to_string(),
                            reason: Some("no".to_string()),
                        },
                        t0(),
                    )
                    .unwrap()
                }
                2 => Command::Cancel {
                    by: "user".to_string(),
                    reason: None,
                    actor: CancelActor::User,
                },
                _ => Command::Cancel {
                    by: "admin1".to_string(),
                    reason: Some("policy".to_string()),
                    actor: CancelActor::Admin,
                },
            };
            run(&active, command, t0()).unwrap()
        })
    }

    proptest! {
        #[test]
        fn terminal_boosts_never_move(
            boost in arb_terminal_boost(),
            commands in proptest::collection::vec(arb_command(), 1..12),
            offset_days in 0i64..60,
        ) {
            prop_assert!(boost.status.is_terminal());
            let now = t0() + Duration::days(offset_days);

            for command in commands {
                let event = command.event();
                let result = plan(&boost, command, now);
                prop_assert_eq!(
                    result.unwrap_err(),
                    Error::InvalidTransition {
                        boost_id: boost.id,
                        status: boost.status,
                        event,
                    }
                );
            }
        }
    }
}
