//! Build script for ddserver-runtime
//!
//! Produces `OUT_DIR/dd_merged_config.rs`:
//! 1. Library defaults below
//! 2. Overridden by any `pub const` found in the file named by `DD_CONFIG_RS`
//!
//! A user file only needs the constants it changes, e.g.
//!
//! ```text
//! pub const POLL_WAIT_US: u64 = 500;
//! pub const HISTORY_LOG_PATH: &str = "/tmp/chat_history.log";
//! ```

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;

/// One tunable: name, Rust type, default expression
struct Param {
    name: &'static str,
    rust_type: &'static str,
    default_value: &'static str,
}

const PARAMS: &[Param] = &[
    Param {
        name: "POLL_WAIT_US",
        rust_type: "u64",
        default_value: "100",
    },
    Param {
        name: "LISTEN_BACKLOG",
        rust_type: "i32",
        default_value: "10",
    },
    Param {
        name: "HISTORY_CAPACITY",
        rust_type: "usize",
        default_value: "50",
    },
    Param {
        name: "HISTORY_LINE_WIDTH",
        rust_type: "usize",
        default_value: "1024",
    },
    Param {
        name: "HISTORY_LOG_PATH",
        rust_type: "&str",
        default_value: "\"server_input.log\"",
    },
    Param {
        name: "PROMPT",
        rust_type: "&str",
        default_value: "\"local_machine\"",
    },
    Param {
        name: "TAGGED_WIRE",
        rust_type: "bool",
        default_value: "false",
    },
    Param {
        name: "COLOR_OUTPUT",
        rust_type: "bool",
        default_value: "true",
    },
];

fn main() {
    let out_dir = env::var("OUT_DIR").expect("OUT_DIR not set");
    let dest = Path::new(&out_dir).join("dd_merged_config.rs");

    let mut values: BTreeMap<&'static str, String> = PARAMS
        .iter()
        .map(|p| (p.name, p.default_value.to_string()))
        .collect();

    println!("cargo:rerun-if-env-changed=DD_CONFIG_RS");

    let user_path = env::var("DD_CONFIG_RS").ok();
    if let Some(path) = &user_path {
        println!("cargo:rerun-if-changed={}", path);
        match fs::read_to_string(path) {
            Ok(content) => {
                for unknown in merge_overrides(&content, &mut values) {
                    println!("cargo:warning=Unknown DD_CONFIG_RS parameter: {}", unknown);
                }
                println!("cargo:warning=Using custom config: {}", path);
            }
            Err(e) => println!("cargo:warning=Failed to read DD_CONFIG_RS ({}): {}", path, e),
        }
    }

    fs::write(&dest, render(&values, user_path.is_some())).expect("Failed to write merged config");
}

/// Apply `pub const NAME: TYPE = VALUE;` lines; returns names not recognized
fn merge_overrides(content: &str, values: &mut BTreeMap<&'static str, String>) -> Vec<String> {
    let mut unknown = Vec::new();
    for line in content.lines().map(str::trim) {
        if line.starts_with("//") {
            continue;
        }
        let Some((name, value)) = split_const(line) else {
            continue;
        };
        match PARAMS.iter().find(|p| p.name == name) {
            Some(param) => {
                values.insert(param.name, value);
            }
            None => unknown.push(name),
        }
    }
    unknown
}

fn split_const(line: &str) -> Option<(String, String)> {
    let rest = line.strip_prefix("pub const ")?;
    let (name, rest) = rest.split_once(':')?;
    let (_, value) = rest.split_once('=')?;
    let value = value.trim().trim_end_matches(';').trim();
    Some((name.trim().to_string(), value.to_string()))
}

fn render(values: &BTreeMap<&'static str, String>, custom: bool) -> String {
    let mut out = String::from("// Auto-generated by build.rs - do not edit\n");
    if custom {
        out.push_str("// Library defaults merged with DD_CONFIG_RS\n\n");
    } else {
        out.push_str("// Library defaults\n\n");
    }
    for param in PARAMS {
        let value = values.get(param.name).map(String::as_str).unwrap_or(param.default_value);
        out.push_str(&format!("pub const {}: {} = {};\n", param.name, param.rust_type, value));
    }
    out
}
