use criterion::{Criterion, criterion_group, criterion_main};
use domain::{
    AggregateRoot, BrokenRuleCollection, Component, Props, TrackingState, TrackingStatus,
    TransitionGraph, ValidatorRuleManager, ValueObject,
};

#[derive(Debug, Clone)]
struct Line {
    sku: String,
    quantity: u32,
}

impl Props for Line {
    fn register_validators(validators: &mut ValidatorRuleManager<Self>) {
        validators
            .add_fn("sku", |line: &Line, rules| {
                rules.add_if(line.sku.trim().is_empty(), "sku", "SKU is required");
            })
            .add_fn("quantity", |line: &Line, rules| {
                rules.add_if(line.quantity == 0, "quantity", "Quantity must be positive");
            });
    }
}

#[derive(Debug, Clone)]
struct Basket {
    lines: Vec<ValueObject<Line>>,
}

impl Props for Basket {
    fn business_rules(&self, rules: &mut BrokenRuleCollection) {
        rules.add_if(self.lines.is_empty(), "lines", "Basket is empty");
    }

    fn children(&self) -> Vec<&dyn Component> {
        self.lines.iter().map(|line| line as &dyn Component).collect()
    }
}

fn lines(count: u32) -> Vec<ValueObject<Line>> {
    (0..count)
        .map(|i| {
            ValueObject::create(Line {
                sku: format!("SKU-{i:03}"),
                quantity: i % 3,
            })
            .unwrap()
        })
        .collect()
}

fn bench_create_aggregate(c: &mut Criterion) {
    c.bench_function("domain/create_aggregate_10_children", |b| {
        b.iter(|| AggregateRoot::create(Basket { lines: lines(10) }).unwrap());
    });
}

fn bench_validate_100_children(c: &mut Criterion) {
    let mut basket = AggregateRoot::create(Basket { lines: lines(100) }).unwrap();

    c.bench_function("domain/validate_100_children", |b| {
        b.iter(|| basket.validate());
    });
}

fn bench_broken_rule_dedup(c: &mut Criterion) {
    c.bench_function("domain/broken_rule_dedup_1000", |b| {
        b.iter(|| {
            let mut rules = BrokenRuleCollection::new();
            for i in 0..1000 {
                rules.add(format!("field{}", i % 10), "Value is invalid");
                rules.add(format!(" FIELD{} ", i % 10), "value is INVALID");
            }
            rules.len()
        });
    });
}

fn bench_detect_changes(c: &mut Criterion) {
    let children: Vec<TrackingState> = (0..100)
        .map(|i| match i % 4 {
            0 => TrackingState::with_status(TrackingStatus::New),
            1 => TrackingState::with_status(TrackingStatus::Dirty),
            _ => TrackingState::new(),
        })
        .collect();

    c.bench_function("domain/detect_changes_100_children", |b| {
        b.iter(|| {
            let mut state = TrackingState::new();
            state.detect_changes(&children);
            state
        });
    });
}

fn bench_transition_lookup(c: &mut Criterion) {
    let mut graph = TransitionGraph::new();
    graph
        .define_transitions((0..50u32).map(|state| (state, vec![state + 1, state + 2])))
        .unwrap();

    c.bench_function("domain/transition_lookup_50_states", |b| {
        b.iter(|| graph.can_transition_to(&49, &50).unwrap());
    });
}

criterion_group!(
    benches,
    bench_create_aggregate,
    bench_validate_100_children,
    bench_broken_rule_dedup,
    bench_detect_changes,
    bench_transition_lookup,
);
criterion_main!(benches);
