//! Integration tests for the aggregate integrity engine.
//!
//! A shipment aggregate with an address value object, parcel children and a
//! guarded status exercises validation roll-up, change detection and event
//! hand-off together.

use std::sync::{Arc, Mutex};

use common::{DomainEvent, EventPublisher, EventRef};
use domain::{
    AggregateRoot, BrokenRuleCollection, Component, DomainError, Props, TrackingStatus,
    TransitionError, TransitionGraph, ValidatorRuleManager, ValueObject,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ShipmentStatus {
    Pending,
    Packed,
    Shipped,
    Delivered,
    Cancelled,
}

fn shipment_graph() -> TransitionGraph<ShipmentStatus> {
    use ShipmentStatus::*;

    let mut graph = TransitionGraph::new();
    graph
        .define_transitions([
            (Pending, vec![Packed, Cancelled]),
            (Packed, vec![Shipped, Cancelled]),
            (Shipped, vec![Delivered]),
        ])
        .unwrap();
    graph
}

#[derive(Debug, Clone, PartialEq)]
struct Address {
    street: String,
    postal_code: String,
}

impl Props for Address {
    fn guard(&self) -> Result<(), DomainError> {
        if self.street.len() > 120 {
            return Err(DomainError::guard("street", "longer than 120 characters"));
        }
        Ok(())
    }

    fn register_validators(validators: &mut ValidatorRuleManager<Self>) {
        validators
            .add_fn("street", |address: &Address, rules| {
                rules.add_if(address.street.trim().is_empty(), "street", "Street is required");
            })
            .add_fn("postal-code", |address: &Address, rules| {
                let digits = address.postal_code.chars().all(|c| c.is_ascii_digit());
                rules.add_if(
                    !digits || address.postal_code.len() != 5,
                    "postal_code",
                    "Postal code must be five digits",
                );
            });
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Parcel {
    weight_grams: u32,
}

impl Props for Parcel {
    fn business_rules(&self, rules: &mut BrokenRuleCollection) {
        rules.add_if(self.weight_grams == 0, "weight_grams", "Parcel weight must be positive");
    }
}

#[derive(Debug, Clone)]
struct Shipment {
    address: ValueObject<Address>,
    parcels: Vec<ValueObject<Parcel>>,
    status: ShipmentStatus,
}

impl Props for Shipment {
    fn business_rules(&self, rules: &mut BrokenRuleCollection) {
        rules.add_if(self.parcels.is_empty(), "parcels", "A shipment needs at least one parcel");
    }

    fn children(&self) -> Vec<&dyn Component> {
        let mut children: Vec<&dyn Component> = Vec::with_capacity(self.parcels.len() + 1);
        children.push(&self.address);
        children.extend(self.parcels.iter().map(|parcel| parcel as &dyn Component));
        children
    }
}

#[derive(Debug)]
struct ShipmentStatusChanged {
    from: ShipmentStatus,
    to: ShipmentStatus,
}

impl DomainEvent for ShipmentStatusChanged {}

fn change_status(
    shipment: &mut AggregateRoot<Shipment>,
    graph: &TransitionGraph<ShipmentStatus>,
    next: ShipmentStatus,
) -> Result<(), DomainError> {
    let from = shipment.props().status;
    graph.validate_transition(&from, &next)?;
    shipment.update(|props| props.status = next)?;
    shipment.add_domain_event(ShipmentStatusChanged { from, to: next });
    Ok(())
}

#[derive(Default)]
struct Outbox {
    events: Mutex<Vec<EventRef>>,
}

impl EventPublisher for Outbox {
    fn publish(&self, event: EventRef) {
        self.events.lock().unwrap().push(event);
    }
}

fn address(street: &str, postal_code: &str) -> ValueObject<Address> {
    ValueObject::create(Address {
        street: street.to_string(),
        postal_code: postal_code.to_string(),
    })
    .unwrap()
}

fn parcel(weight_grams: u32) -> ValueObject<Parcel> {
    ValueObject::create(Parcel { weight_grams }).unwrap()
}

fn shipment(
    address: ValueObject<Address>,
    parcels: Vec<ValueObject<Parcel>>,
) -> AggregateRoot<Shipment> {
    AggregateRoot::create(Shipment {
        address,
        parcels,
        status: ShipmentStatus::Pending,
    })
    .unwrap()
}

mod validation {
    use super::*;

    #[test]
    fn valid_shipment_has_no_broken_rules() {
        let shipment = shipment(address("1 Main St", "12345"), vec![parcel(500)]);
        assert!(shipment.is_valid());
        assert!(shipment.tracking_state().is_new());
    }

    #[test]
    fn child_rules_roll_up_to_the_aggregate() {
        let shipment = shipment(address(" ", "12a45"), vec![parcel(500), parcel(0)]);

        assert!(!shipment.is_valid());
        assert_eq!(
            shipment.broken_rules().messages(),
            vec![
                "street: Street is required",
                "postal_code: Postal code must be five digits",
                "weight_grams: Parcel weight must be positive",
            ]
        );
    }

    #[test]
    fn identical_child_failures_are_reported_once() {
        let shipment = shipment(address("1 Main St", "12345"), vec![parcel(0), parcel(0)]);
        assert_eq!(shipment.broken_rules().len(), 1);
    }

    #[test]
    fn guard_failure_rejects_construction() {
        let result = ValueObject::create(Address {
            street: "x".repeat(121),
            postal_code: "12345".to_string(),
        });
        assert!(matches!(
            result,
            Err(DomainError::Guard { ref property, .. }) if property == "street"
        ));
    }

    #[test]
    fn fixing_a_child_revalidates_the_parent() {
        let mut shipment = shipment(address("1 Main St", "12345"), Vec::new());
        assert!(!shipment.is_valid());

        shipment
            .update(|props| props.parcels.push(parcel(250)))
            .unwrap();

        assert!(shipment.is_valid());
        assert!(shipment.tracking_state().is_dirty());
    }
}

mod change_detection {
    use super::*;

    #[test]
    fn loaded_aggregate_with_clean_children_stays_clean() {
        let mut shipment = AggregateRoot::load(
            common::EntityId::new(),
            Shipment {
                address: ValueObject::load(Address {
                    street: "1 Main St".into(),
                    postal_code: "12345".into(),
                })
                .unwrap(),
                parcels: vec![ValueObject::load(Parcel { weight_grams: 10 }).unwrap()],
                status: ShipmentStatus::Packed,
            },
        )
        .unwrap();

        shipment.detect_changes();
        assert!(shipment.tracking_state().is_clean());
    }

    #[test]
    fn most_destructive_child_state_wins() {
        let mut removed = parcel(10);
        removed.delete();
        let mut shipment = shipment(address("1 Main St", "12345"), vec![parcel(20), removed]);
        shipment.mark_clean();

        shipment.detect_changes();

        assert_eq!(
            shipment.tracking_state().status(),
            Some(TrackingStatus::Deleted)
        );
    }
}

mod status_transitions {
    use super::*;

    #[test]
    fn guarded_path_records_events() {
        let graph = shipment_graph();
        let outbox = Arc::new(Outbox::default());
        let mut shipment = shipment(address("1 Main St", "12345"), vec![parcel(500)]);
        shipment.merge_publisher(outbox.clone());

        change_status(&mut shipment, &graph, ShipmentStatus::Packed).unwrap();
        change_status(&mut shipment, &graph, ShipmentStatus::Shipped).unwrap();
        assert_eq!(shipment.commit().unwrap(), 2);

        let events = outbox.events.lock().unwrap();
        let steps: Vec<(ShipmentStatus, ShipmentStatus)> = events
            .iter()
            .map(|event| {
                let changed = event.downcast_ref::<ShipmentStatusChanged>().unwrap();
                (changed.from, changed.to)
            })
            .collect();
        assert_eq!(
            steps,
            vec![
                (ShipmentStatus::Pending, ShipmentStatus::Packed),
                (ShipmentStatus::Packed, ShipmentStatus::Shipped),
            ]
        );
    }

    #[test]
    fn illegal_transition_leaves_aggregate_untouched() {
        let graph = shipment_graph();
        let mut shipment = shipment(address("1 Main St", "12345"), vec![parcel(500)]);

        let result = change_status(&mut shipment, &graph, ShipmentStatus::Delivered);

        assert!(matches!(
            result,
            Err(DomainError::Transition(TransitionError::InvalidTransition { .. }))
        ));
        assert_eq!(shipment.props().status, ShipmentStatus::Pending);
        assert!(shipment.uncommitted_events().is_empty());
    }

    #[test]
    fn terminal_state_has_no_transitions() {
        let graph = shipment_graph();
        let result = graph.can_transition_to(&ShipmentStatus::Delivered, &ShipmentStatus::Pending);
        assert!(matches!(
            result,
            Err(TransitionError::NoTransitionsDefined { .. })
        ));
    }
}
