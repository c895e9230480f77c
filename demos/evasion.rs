//! Evasion of a character with two local item bases.
//!
//! Run with `RUST_LOG=statgraph=debug cargo run --example evasion` to see
//! batches, evaluations and pruning passes.

use statgraph::value::PerStatValue;
use statgraph::*;
use std::sync::Arc;

fn main() -> Result<(), StatError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut calculator = Calculator::new();
    let evasion = Stat::new("Evasion");
    let level = Stat::new("Level");
    let dexterity = Stat::new("Dexterity");
    let global = ModifierSource::global();
    let body = ModifierSource::item(ItemSlot::BodyArmour, "Sadist Garb");
    let shield = ModifierSource::item(ItemSlot::OffHand, "Rathpith Globe");

    let total = calculator.node(&evasion, NodeType::Total)?;
    total.subscribe(|change| {
        tracing::info!(previous = ?change.previous, current = ?change.current, "evasion changed");
    });

    calculator
        .new_batch_update()
        .add(&evasion, Form::BaseSet, 53.0, global.clone())
        .add(&evasion, Form::BaseAdd, Arc::new(PerStatValue::new(level.clone(), 3.0, 1.0)), global.clone())
        .add(&evasion, Form::BaseSet, 1000.0, body.clone())
        .add(&evasion, Form::BaseSet, 500.0, shield.clone())
        .add(&evasion, Form::Increase, 100.0, global.clone())
        .add(&evasion, Form::Increase, Arc::new(PerStatValue::new(dexterity.clone(), 1.0, 5.0)), global.clone())
        .add(&evasion, Form::Increase, 20.0, shield)
        .add(&evasion, Form::More, 100.0, body)
        .add(&level, Form::BaseSet, 90.0, global.clone())
        .add(&dexterity, Form::BaseSet, 32.0, global.clone())
        .add(&dexterity, Form::BaseAdd, 50.0, global.clone())
        .do_update()?;

    let breakdown = calculator.breakdown(&evasion)?;
    println!("{}", breakdown.to_json()?);

    // Levelling up only recomputes what depends on the level.
    calculator
        .new_batch_update()
        .add(&level, Form::BaseAdd, 1.0, global)
        .do_update()?;
    println!("Evasion at level 91: {:?}", total.value());

    Ok(())
}
