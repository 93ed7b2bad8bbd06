//! `shipyard modes` — show the mode policy table.

use anyhow::Result;
use console::style;

use shipyard::policy::{ALL_MODES, CRITICAL_THRESHOLD, priority};
use shipyard::step::SEQUENCE;

pub fn execute() -> Result<()> {
    println!(
        "{} (priority >= {} is critical: failure aborts the pipeline)\n",
        style("Mode policy").bold(),
        CRITICAL_THRESHOLD
    );

    print!("{:<14}", "mode");
    for kind in SEQUENCE {
        print!("{:<10}", kind.to_string());
    }
    println!();

    for mode in ALL_MODES {
        print!("{:<14}", mode.to_string());
        for kind in SEQUENCE {
            let p = priority(mode, kind);
            let cell = if p >= CRITICAL_THRESHOLD {
                format!("{p} crit")
            } else {
                format!("{p} opt")
            };
            print!("{cell:<10}");
        }
        println!();
    }

    Ok(())
}
