//! Bouncing particles: a movement system integrates velocities, a bounds
//! system reflects particles at the walls and emits an event, and a counter
//! system reads those events one step later.
//!
//! Run with: `RUST_LOG=iodine_ecs=trace cargo run --example movement`

use std::sync::Arc;

use iodine_ecs::prelude::*;
use parking_lot::Mutex;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, PartialEq)]
struct Position {
    x: f32,
    y: f32,
}

#[derive(Debug, Clone, PartialEq)]
struct Velocity {
    dx: f32,
    dy: f32,
}

#[derive(Debug, Clone)]
struct Bounced {
    entity: Entity,
}

iodine_ecs::component!(Position, Velocity);
iodine_ecs::event!(Bounced);

const WIDTH: f32 = 100.0;

fn main() -> Result<(), EcsError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = EcsConfig::from_json(r#"{ "initial_entities": 256, "event_capacity": 32 }"#)?;
    let mut ecs = Ecs::with_config(config);
    let bounced = ecs.enter_event::<Bounced>()?;

    let movement = ecs
        .system("movement")
        .reads::<(Velocity,)>()
        .writes::<(Position,)>()
        .build(|ctx| {
            let Ok(mut view) = ctx.view::<(&mut Position, &Velocity)>() else {
                return;
            };
            for (_, (pos, vel)) in view.iter() {
                pos.x += vel.dx;
                pos.y += vel.dy;
            }
        })?;

    let bounds = ecs
        .system("bounds")
        .reads::<(Position,)>()
        .writes::<(Velocity,)>()
        .allow_partial(true)
        .emits(&[bounced])
        .build(|ctx| {
            let mut hits = Vec::new();
            if let Ok(mut view) = ctx.view::<(&Position, &mut Velocity)>() {
                for (entity, (pos, vel)) in view.iter() {
                    if pos.x < 0.0 || pos.x > WIDTH {
                        vel.dx = -vel.dx;
                        hits.push(entity);
                    }
                }
            }
            for entity in hits {
                let _ = ctx.emit(Bounced { entity });
            }
        })?;

    let total = Arc::new(Mutex::new(0usize));
    let sink = Arc::clone(&total);
    let counter = ecs
        .system("bounce_counter")
        .listens(&[bounced])
        .build(move |ctx| {
            if let Ok(n) = ctx.read::<Bounced, _>(|events| events.len()) {
                *sink.lock() += n;
            }
        })?;

    let movement = ecs.add_system(movement)?;
    let bounds = ecs.add_system(bounds)?;
    ecs.add_system(counter)?;

    {
        let systems = ecs.systems();
        let a = systems.get(movement)?.group();
        let b = systems.get(bounds)?.group();
        info!(
            movement = a.signature(ecs.components()),
            bounds = b.signature(ecs.components()),
            parallel = a.can_run_with(b),
            "system groups"
        );
    }

    for i in 0..64 {
        let e = ecs.create();
        ecs.insert(e, Position { x: (i % 10) as f32 * 10.0, y: 0.0 })?;
        ecs.insert(e, Velocity { dx: 1.0 + (i % 3) as f32, dy: 0.0 })?;
    }

    ecs.run(120);

    let diagnostics = ecs.last_diagnostics();
    for (name, time) in &diagnostics.system_times {
        info!(system = %name, ?time, "last step");
    }
    info!(steps = ecs.step_count(), bounces = *total.lock(), "done");
    Ok(())
}
