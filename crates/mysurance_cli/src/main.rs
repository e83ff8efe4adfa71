//! CLI smoke entry point.
//!
//! # Responsibility
//! - Wire the core against an in-memory repository and print the live list.
//! - Keep output deterministic apart from generated ids and timestamps.

use mysurance_core::{
    core_version, PolicyDraft, PolicyStore, SqlitePolicyRepository, StoreConfig,
};
use std::process::ExitCode;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("mysurance: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("mysurance_core version={}", core_version());

    let repo = SqlitePolicyRepository::in_memory()?;
    let store = PolicyStore::connect(repo, StoreConfig::default())?;

    store.update_draft(|draft: PolicyDraft| {
        draft
            .with_name("Car")
            .with_kind("Vehicle insurance")
            .with_value("500")
    })?;
    let slider = store.draft().excess_slider();
    println!("excess slider max={} marks={:?}", slider.max, slider.marks);
    store.update_draft(|draft| draft.with_excess(20.0))?;
    let car = store.create()?;

    store.update_draft(|draft| draft.with_name("Flat").with_kind("Home").with_value("1200"))?;
    store.create()?;
    store.delete(car)?;

    let list = store.policies();
    println!("revision={} policies={}", list.revision, list.len());
    for policy in list.iter() {
        println!(
            "- {} ({}) {} € /mo, excess {} €, created {}",
            policy.content,
            policy.display_kind(),
            policy.value,
            policy.excess_or_zero(),
            policy.created_at.to_rfc3339()
        );
    }
    Ok(())
}
