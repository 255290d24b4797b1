//! Script composition: polyfills first, application code last.

use crate::polyfills::{process_polyfill, CONSOLE_POLYFILL, TEXT_ENCODING_POLYFILL};

/// Joins fragments written in polyfills-last order into one program.
///
/// Fragments are emitted in reverse, each followed by a newline, so the last
/// fragment given runs first.
pub fn compose_scripts<S: AsRef<str>>(fragments: &[S]) -> String {
    let capacity = fragments.iter().map(|f| f.as_ref().len() + 1).sum();
    let mut script = String::with_capacity(capacity);
    for fragment in fragments.iter().rev() {
        script.push_str(fragment.as_ref());
        script.push('\n');
    }
    script
}

/// Builds the SSR program: polyfill bank followed by the bundled application.
pub fn compose_ssr_script(bundle: &str, node_env: &str) -> String {
    let process = process_polyfill(node_env);
    compose_scripts(&[
        bundle,
        TEXT_ENCODING_POLYFILL,
        CONSOLE_POLYFILL,
        process.as_str(),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reverses_and_terminates_each_fragment() {
        assert_eq!(compose_scripts(&["app();", "b();", "a();"]), "a();\nb();\napp();\n");
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(compose_scripts::<&str>(&[]), "");
    }

    #[test]
    fn test_ssr_script_puts_bundle_last() {
        let script = compose_ssr_script("/*bundle*/", "production");
        let process = script.find("globalThis.process").unwrap();
        let console = script.find("globalThis.console").unwrap();
        let encoder = script.find("globalThis.TextEncoder").unwrap();
        let bundle = script.find("/*bundle*/").unwrap();
        assert!(process < console && console < encoder && encoder < bundle);
        assert!(script.ends_with("/*bundle*/\n"));
    }
}
