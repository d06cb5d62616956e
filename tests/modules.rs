//! Module/script graph loading, executed through the public file entry
//! point in both modes.

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use tsar_lang::runtime::{BufferSink, ExecMode};
use tsar_lang::run_file;

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

fn run(name: &str, mode: ExecMode) -> Result<String, String> {
    let sink = Rc::new(RefCell::new(BufferSink::default()));
    match run_file(&fixture(name), mode, sink.clone()) {
        Ok(()) => {
            let buffer = sink.borrow().buffer.clone();
            Ok(buffer)
        }
        Err(error) => Err(error.message),
    }
}

fn both(name: &str) -> String {
    let interpreted = run(name, ExecMode::Interpret).unwrap();
    let compiled = run(name, ExecMode::Compile).unwrap();
    assert_eq!(interpreted, compiled, "modes diverged for {name}");
    interpreted
}

#[test]
fn references_execute_before_the_referencing_script_each_once() {
    // util is referenced both directly and transitively; it executes once
    assert_eq!(both("main.ts"), "util\nhelper sees util\nmain\n");
}

#[test]
fn scripts_share_the_global_scope() {
    assert_eq!(both("helper.ts"), "util\nhelper sees util\n");
}

#[test]
fn modules_import_named_exports() {
    assert_eq!(both("uses_mod.ts"), "42\n");
}

#[test]
fn circular_references_abort_the_load() {
    for mode in [ExecMode::Interpret, ExecMode::Compile] {
        let message = run("cycle_a.ts", mode).unwrap_err();
        assert!(message.contains("circular"), "{message}");
    }
}

#[test]
fn reference_directives_are_rejected_inside_modules() {
    let message = run("bad_module_ref.ts", ExecMode::Interpret).unwrap_err();
    assert!(message.contains("script"), "{message}");
}

#[test]
fn referencing_a_module_is_rejected() {
    let message = run("refs_a_module.ts", ExecMode::Interpret).unwrap_err();
    assert!(message.contains("module"), "{message}");
}

#[test]
fn missing_files_are_reported_as_not_found() {
    let message = run("does_not_exist.ts", ExecMode::Interpret).unwrap_err();
    assert!(message.contains("not found"), "{message}");
}
