//! Delivery state machine.

use common::{AppError, ShipmentStatus};
use thiserror::Error;

/// Saga events that move a shipment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeliveryEvent {
    /// `new_shipment_delivery`: a destination post accepts the shipment.
    Accept,
    /// `commit_delivery`: the reservation was released.
    Commit,
    /// `cancel_delivery`: a downstream step failed.
    Cancel,
}

impl DeliveryEvent {
    pub const ALL: [DeliveryEvent; 3] = [
        DeliveryEvent::Accept,
        DeliveryEvent::Commit,
        DeliveryEvent::Cancel,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryEvent::Accept => "accept_delivery",
            DeliveryEvent::Commit => "commit_delivery",
            DeliveryEvent::Cancel => "cancel_delivery",
        }
    }
}

/// Message to publish after a successful transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Emission {
    /// Forward the shipment to the post service (`new_post_delivery`).
    RegisterDelivery,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub next: ShipmentStatus,
    pub emit: Option<Emission>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("forbidden to change status of cancelled shipment")]
    Cancelled,

    #[error("forbidden to transfer shipment status from '{from}' to '{to}'")]
    Forbidden {
        from: ShipmentStatus,
        to: ShipmentStatus,
    },
}

impl From<TransitionError> for AppError {
    fn from(e: TransitionError) -> Self {
        AppError::bad_request(e.to_string())
    }
}

/// Decides the outcome of `event` on a shipment in `status`.
///
/// | event  | allowed when                          | next           | emits            |
/// |--------|---------------------------------------|----------------|------------------|
/// | Accept | not cancelled, before AcceptDelivery | AcceptDelivery | RegisterDelivery |
/// | Commit | not cancelled                         | InDelivery     |                  |
/// | Cancel | not cancelled                         | Packing        |                  |
///
/// Cancel resets to `Packing` so the shipment can be offered for delivery
/// again; nothing moves a shipment into `Cancelled`.
pub fn transition(
    status: ShipmentStatus,
    event: DeliveryEvent,
) -> Result<Transition, TransitionError> {
    if status.is_cancelled() {
        return Err(TransitionError::Cancelled);
    }
    match event {
        DeliveryEvent::Accept => {
            let next = ShipmentStatus::AcceptDelivery;
            if status >= next {
                return Err(TransitionError::Forbidden { from: status, to: next });
            }
            Ok(Transition {
                next,
                emit: Some(Emission::RegisterDelivery),
            })
        }
        DeliveryEvent::Commit => Ok(Transition {
            next: ShipmentStatus::InDelivery,
            emit: None,
        }),
        DeliveryEvent::Cancel => Ok(Transition {
            next: ShipmentStatus::Packing,
            emit: None,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ShipmentStatus::*;

    #[test]
    fn test_accept_from_created() {
        assert_eq!(
            transition(Created, DeliveryEvent::Accept),
            Ok(Transition {
                next: AcceptDelivery,
                emit: Some(Emission::RegisterDelivery)
            })
        );
    }

    #[test]
    fn test_accept_rejected_from_cancelled_and_self() {
        let err: AppError = transition(Cancelled, DeliveryEvent::Accept).unwrap_err().into();
        assert_eq!(err.status_code(), 400);

        let err: AppError = transition(AcceptDelivery, DeliveryEvent::Accept)
            .unwrap_err()
            .into();
        assert_eq!(err.status_code(), 400);
        assert_eq!(
            err.message(),
            "forbidden to transfer shipment status from 'AcceptDelivery' to 'AcceptDelivery'"
        );
    }

    #[test]
    fn test_every_state_and_event() {
        for status in ShipmentStatus::ALL {
            for event in DeliveryEvent::ALL {
                let result = transition(status, event);
                let expected = match (status, event) {
                    (Cancelled, _) => Err(TransitionError::Cancelled),
                    (Created | Packing, DeliveryEvent::Accept) => Ok(Transition {
                        next: AcceptDelivery,
                        emit: Some(Emission::RegisterDelivery),
                    }),
                    (from, DeliveryEvent::Accept) => Err(TransitionError::Forbidden {
                        from,
                        to: AcceptDelivery,
                    }),
                    (_, DeliveryEvent::Commit) => Ok(Transition {
                        next: InDelivery,
                        emit: None,
                    }),
                    (_, DeliveryEvent::Cancel) => Ok(Transition {
                        next: Packing,
                        emit: None,
                    }),
                };
                assert_eq!(result, expected, "{status} on {}", event.as_str());
            }
        }
    }

    #[test]
    fn test_cancel_resets_to_packing() {
        for status in [AcceptDelivery, InDelivery, Delivered, Received] {
            assert_eq!(transition(status, DeliveryEvent::Cancel).unwrap().next, Packing);
        }
    }

    #[test]
    fn test_only_accept_emits() {
        for status in ShipmentStatus::ALL {
            for event in [DeliveryEvent::Commit, DeliveryEvent::Cancel] {
                if let Ok(t) = transition(status, event) {
                    assert_eq!(t.emit, None);
                }
            }
        }
    }
}
