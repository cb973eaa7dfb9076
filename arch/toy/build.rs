mod lang;

use std::{env, path::Path, process};

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=lang.rs");

    let out = match env::var_os("OUT_DIR") {
        Some(out) => out,
        None => {
            eprintln!("OUT_DIR is not set");
            process::exit(1);
        }
    };
    if let Err(err) = lang::language().write(Path::new(&out).join("toy.sla")) {
        eprintln!("{err}");
        process::exit(1);
    }
}
