//! Property tests for ECS operations.
//!
//! These tests use `proptest` to generate random sequences of ECS operations
//! and verify that registry invariants hold after each sequence.

use std::sync::Arc;

use iodine_ecs::prelude::*;
use parking_lot::Mutex;
use proptest::prelude::*;

#[derive(Debug, Clone, PartialEq)]
struct Pos {
    x: f32,
    y: f32,
}

#[derive(Debug, Clone, PartialEq)]
struct Vel {
    dx: f32,
    dy: f32,
}

iodine_ecs::component!(Pos, Vel);

/// Operations we can perform on the ECS.
#[derive(Debug, Clone)]
enum EcsOp {
    SpawnPos(f32, f32),
    SpawnPosVel(f32, f32, f32, f32),
    Destroy(usize),
    InsertVel(usize, f32, f32),
    RemoveVel(usize),
    Step,
}

/// Strategy that generates finite (non-NaN, non-Inf) f32 values.
fn finite_f32() -> impl Strategy<Value = f32> {
    (-1_000_000i32..1_000_000i32).prop_map(|v| v as f32 * 0.01)
}

fn ecs_op_strategy() -> impl Strategy<Value = EcsOp> {
    prop_oneof![
        (finite_f32(), finite_f32()).prop_map(|(x, y)| EcsOp::SpawnPos(x, y)),
        (finite_f32(), finite_f32(), finite_f32(), finite_f32())
            .prop_map(|(x, y, dx, dy)| EcsOp::SpawnPosVel(x, y, dx, dy)),
        (0..100usize).prop_map(EcsOp::Destroy),
        (0..100usize, finite_f32(), finite_f32())
            .prop_map(|(i, dx, dy)| EcsOp::InsertVel(i, dx, dy)),
        (0..100usize).prop_map(EcsOp::RemoveVel),
        Just(EcsOp::Step),
    ]
}

/// An ECS with one system that counts the entities it visits each step.
fn counting_ecs() -> (Ecs, Arc<Mutex<usize>>) {
    let mut ecs = Ecs::new();
    let visited = Arc::new(Mutex::new(0));
    let sink = Arc::clone(&visited);
    let system = ecs
        .system("count")
        .reads::<(Vel,)>()
        .writes::<(Pos,)>()
        .build(move |ctx| {
            let mut view = ctx.view::<(&mut Pos, &Vel)>().unwrap();
            *sink.lock() = view.iter().count();
        })
        .unwrap();
    ecs.add_system(system).unwrap();
    (ecs, visited)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(2_000))]

    #[test]
    fn ecs_random_ops_preserve_invariants(ops in prop::collection::vec(ecs_op_strategy(), 1..50)) {
        let (mut ecs, visited) = counting_ecs();
        let mut alive: Vec<Entity> = Vec::new();

        for op in ops {
            match op {
                EcsOp::SpawnPos(x, y) => {
                    let e = ecs.create();
                    ecs.insert(e, Pos { x, y }).unwrap();
                    alive.push(e);
                }
                EcsOp::SpawnPosVel(x, y, dx, dy) => {
                    let e = ecs.create();
                    ecs.insert(e, Pos { x, y }).unwrap();
                    ecs.insert(e, Vel { dx, dy }).unwrap();
                    alive.push(e);
                }
                EcsOp::Destroy(idx) => {
                    if !alive.is_empty() {
                        let idx = idx % alive.len();
                        let e = alive.remove(idx);
                        ecs.destroy(e).unwrap();
                    }
                }
                EcsOp::InsertVel(idx, dx, dy) => {
                    if !alive.is_empty() {
                        let idx = idx % alive.len();
                        ecs.insert(alive[idx], Vel { dx, dy }).unwrap();
                    }
                }
                EcsOp::RemoveVel(idx) => {
                    if !alive.is_empty() {
                        let idx = idx % alive.len();
                        let _ = ecs.remove::<Vel>(alive[idx]);
                    }
                }
                EcsOp::Step => {
                    ecs.step();
                    let expected = alive.iter().filter(|&&e| ecs.contains::<Vel>(e)).count();
                    prop_assert_eq!(*visited.lock(), expected);
                }
            }

            // Invariant: alive_count matches our tracking.
            prop_assert_eq!(ecs.alive_count(), alive.len());

            // Invariant: all tracked entities are alive and keep their Pos.
            for &e in &alive {
                prop_assert!(ecs.is_alive(e));
                prop_assert!(ecs.contains::<Pos>(e));
            }

            // Invariant: pools hold nothing for dead entities.
            let pos_len = ecs.components().pool::<Pos>().unwrap().read().len();
            prop_assert_eq!(pos_len, alive.len());
        }
    }

    /// After destroying an entity, any access through the old handle fails,
    /// even once its index has been recycled.
    #[test]
    fn stale_ids_detected_after_destroy_and_recycle(
        spawn_count in 1..20usize,
        destroy_indices in prop::collection::vec(0..20usize, 1..10),
    ) {
        let ecs = Ecs::new();
        let mut entities: Vec<Entity> = Vec::new();
        for i in 0..spawn_count {
            let e = ecs.create();
            ecs.insert(e, Pos { x: i as f32, y: 0.0 }).unwrap();
            entities.push(e);
        }

        let mut stale_ids: Vec<Entity> = Vec::new();
        for &idx in &destroy_indices {
            if !entities.is_empty() {
                let idx = idx % entities.len();
                let e = entities.remove(idx);
                ecs.destroy(e).unwrap();
                stale_ids.push(e);
            }
        }

        for _ in 0..stale_ids.len() {
            let e = ecs.create();
            ecs.insert(e, Pos { x: 999.0, y: 999.0 }).unwrap();
            entities.push(e);
        }

        for &stale in &stale_ids {
            prop_assert!(!ecs.is_alive(stale));
            prop_assert!(ecs.get::<Pos>(stale).is_err());
            prop_assert!(ecs.destroy(stale).is_err());
        }

        for &e in &entities {
            prop_assert!(ecs.is_alive(e));
            prop_assert!(ecs.get::<Pos>(e).is_ok());
        }
    }

    /// Removing and re-adding a component leaves the other component intact.
    #[test]
    fn component_churn_preserves_data(
        initial_x in finite_f32(),
        initial_y in finite_f32(),
        vel_dx in finite_f32(),
        vel_dy in finite_f32(),
        do_remove in proptest::bool::ANY,
    ) {
        let ecs = Ecs::new();
        let e = ecs.create();
        ecs.insert(e, Pos { x: initial_x, y: initial_y }).unwrap();
        ecs.insert(e, Vel { dx: vel_dx, dy: vel_dy }).unwrap();

        {
            let pos = ecs.get::<Pos>(e).unwrap();
            prop_assert_eq!(pos.x, initial_x);
            prop_assert_eq!(pos.y, initial_y);
        }
        {
            let vel = ecs.get::<Vel>(e).unwrap();
            prop_assert_eq!(vel.dx, vel_dx);
            prop_assert_eq!(vel.dy, vel_dy);
        }

        if do_remove {
            prop_assert_eq!(ecs.remove::<Vel>(e).unwrap(), Some(Vel { dx: vel_dx, dy: vel_dy }));
            let pos = ecs.get::<Pos>(e).unwrap();
            prop_assert_eq!(pos.x, initial_x);
            prop_assert!(!ecs.contains::<Vel>(e));
        }
    }

    /// Entities keep independent data while their neighbours are destroyed.
    #[test]
    fn multiple_entities_independent_data(count in 2..50usize) {
        let ecs = Ecs::new();
        let mut entities = Vec::new();
        for i in 0..count {
            let e = ecs.create();
            ecs.insert(e, Pos { x: i as f32, y: (i * 2) as f32 }).unwrap();
            entities.push((i, e));
        }

        let mid = count / 2;
        let (_, mid_e) = entities.remove(mid);
        ecs.destroy(mid_e).unwrap();
        prop_assert_eq!(ecs.alive_count(), entities.len());

        for &(i, e) in &entities {
            let pos = ecs.get::<Pos>(e).unwrap();
            prop_assert_eq!(pos.x, i as f32);
            prop_assert_eq!(pos.y, (i * 2) as f32);
        }
    }
}
