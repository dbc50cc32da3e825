// SPDX-FileCopyrightText: 2026 Ferry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `ferry doctor` - environment checks without starting the pipeline.

use std::path::Path;

use ferry_config::FerryConfig;
use ferry_core::FerryError;
use ferry_storage::Database;

pub async fn run_doctor(config: &FerryConfig) -> Result<(), FerryError> {
    let mut failures = 0usize;

    // Configuration completeness.
    match config.validate() {
        Ok(()) => println!("ok   configuration valid"),
        Err(e) => {
            failures += 1;
            println!("FAIL configuration: {e}");
        }
    }

    // Storage: open (creating if needed) and close again.
    match Database::open(&config.session.db_path).await {
        Ok(db) => {
            println!("ok   database at {}", config.session.db_path);
            if let Err(e) = db.close().await {
                failures += 1;
                println!("FAIL database close: {e}");
            }
        }
        Err(e) => {
            failures += 1;
            println!("FAIL database: {e}");
        }
    }

    // Backend binary resolvable and working dir present.
    if find_in_path(&config.backend.program) {
        println!("ok   backend program '{}' found on PATH", config.backend.program);
    } else {
        failures += 1;
        println!("FAIL backend program '{}' not found on PATH", config.backend.program);
    }
    if Path::new(&config.backend.working_dir).is_dir() {
        println!("ok   backend working dir {}", config.backend.working_dir);
    } else {
        failures += 1;
        println!("FAIL backend working dir {} does not exist", config.backend.working_dir);
    }

    // Classifier is optional; report its state either way.
    if config.classifier.api_key.is_some() {
        println!("ok   classifier configured ({})", config.classifier.model);
    } else {
        println!("note classifier disabled: group chatter digests unconditionally");
    }

    if failures > 0 {
        return Err(FerryError::Config(format!("{failures} check(s) failed")));
    }
    println!("all checks passed");
    Ok(())
}

/// Whether `program` resolves via PATH (or is an existing explicit path).
fn find_in_path(program: &str) -> bool {
    let path = Path::new(program);
    if path.components().count() > 1 {
        return path.is_file();
    }
    let Some(paths) = std::env::var_os("PATH") else {
        return false;
    };
    std::env::split_paths(&paths).any(|dir| dir.join(program).is_file())
}
