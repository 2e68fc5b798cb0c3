//! Writes TypeScript declarations for the habit API types.
//!
//! cargo run --bin gen_types --features ts-rs -- web/src/types/generated.ts

use habitual::{CreateInput, Habit, IdInput, ToggleInput, UpdateInput, TS};
use std::path::PathBuf;

fn main() {
    let out = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("web/src/types/generated.ts"));

    let decls = [
        Habit::decl(),
        CreateInput::decl(),
        UpdateInput::decl(),
        ToggleInput::decl(),
        IdInput::decl(),
    ];

    let mut contents = String::from("// Generated by gen_types. Do not edit by hand.\n\n");
    for decl in decls {
        contents.push_str("export ");
        contents.push_str(&decl);
        contents.push_str("\n\n");
    }

    if let Some(parent) = out.parent() {
        if !parent.as_os_str().is_empty() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                eprintln!("Could not create {}: {}", parent.display(), e);
                std::process::exit(1);
            }
        }
    }

    if let Err(e) = std::fs::write(&out, contents) {
        eprintln!("Could not write {}: {}", out.display(), e);
        std::process::exit(1);
    }
    println!("Wrote {}", out.display());
}
