//! Bundles the module-semantics fixture and evaluates it in a real runtime.

use std::path::PathBuf;

use jsx_ssr::bundler::{BundleOptions, Bundler};
use jsx_ssr::{compose_ssr_script, node_env, JsHost, RuntimeConfig};
use serde_json::{json, Value};

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

async fn evaluate(production: bool) -> Value {
    let bundler = Bundler::new(BundleOptions {
        production,
        ..BundleOptions::default()
    })
    .unwrap();
    let bundle = bundler.bundle(&fixture("semantics/entry.js")).unwrap();

    let mut host = JsHost::new(&RuntimeConfig::default());
    host.initialize(&compose_ssr_script(&bundle.code, node_env(production)))
        .unwrap();
    let out = host.render(r#"{"echo":"props"}"#).await.unwrap();
    serde_json::from_str(&out.html).unwrap()
}

fn expected(env: &str) -> Value {
    json!({
        "greet": "default",
        "named": "named",
        "counter": 1,
        "live": 1,
        "cycle": "b sees a",
        "again": "named",
        "star": "star",
        "legacy": "cjs",
        "helper": "helped",
        "items": 3,
        "lazy": "lazy",
        "env": env,
        "echo": "props",
    })
}

#[tokio::test]
async fn test_module_semantics_development() {
    assert_eq!(evaluate(false).await, expected("development"));
}

#[tokio::test]
async fn test_module_semantics_minified() {
    assert_eq!(evaluate(true).await, expected("production"));
}

#[test]
fn test_bundle_lists_every_input() {
    let bundler = Bundler::new(BundleOptions::default()).unwrap();
    let bundle = bundler.bundle(&fixture("semantics/entry.js")).unwrap();

    let names: Vec<String> = bundle
        .inputs
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    for name in ["entry.js", "esm.js", "reexport.js", "star.js", "lib.js", "data.json", "cycle_a.js", "cycle_b.js", "lazy.js"] {
        assert!(names.iter().any(|n| n == name), "missing {name} in {names:?}");
    }
    assert_eq!(names[0], "entry.js");
}

#[test]
fn test_browser_condition_is_preferred() {
    let bundler = Bundler::new(BundleOptions::default()).unwrap();
    let bundle = bundler.bundle(&fixture("app/ssr.jsx")).unwrap();
    assert!(bundle.inputs.iter().any(|p| p.ends_with("server.browser.js")));
    assert!(!bundle.inputs.iter().any(|p| p.ends_with("server.node.js")));
}
