//! Polyfill bank for the embedded runtime.
//!
//! V8 on its own has no `process`, no useful `console` and no
//! `TextEncoder`/`TextDecoder`. React's server renderer touches all three, so
//! these shims are prepended to the SSR bundle before it is evaluated.

/// `console` shim that forwards to the capture ops registered by the runtime.
///
/// Falls back to no-ops when the ops are absent, so the shim is safe to
/// evaluate in a bare context.
pub const CONSOLE_POLYFILL: &str = r#"
globalThis.console = (function () {
    var ops = (globalThis.Deno && Deno.core && Deno.core.ops) || {};
    function format(args) {
        return Array.prototype.map.call(args, function (a) {
            if (typeof a === 'string') return a;
            try { return JSON.stringify(a); } catch (_) { return String(a); }
        }).join(' ');
    }
    function sink(op) {
        return typeof op === 'function'
            ? function () { op(format(arguments)); }
            : function () {};
    }
    return {
        log: sink(ops.op_console_log),
        info: sink(ops.op_console_log),
        debug: function () {},
        warn: sink(ops.op_console_warn),
        error: sink(ops.op_console_error),
    };
})();
"#;

/// `TextEncoder` / `TextDecoder` shims (UTF-8 only).
///
/// Lone surrogates and malformed byte sequences become U+FFFD instead of
/// throwing.
pub const TEXT_ENCODING_POLYFILL: &str = r#"
if (typeof globalThis.TextEncoder === 'undefined') {
    const encodeLossy = function (str) {
        const out = [];
        for (let i = 0; i < str.length; i++) {
            let c = str.charCodeAt(i);
            if (c >= 0xd800 && c <= 0xdbff && i + 1 < str.length) {
                const next = str.charCodeAt(i + 1);
                if (next >= 0xdc00 && next <= 0xdfff) {
                    c = 0x10000 + ((c - 0xd800) << 10) + (next - 0xdc00);
                    i++;
                }
            }
            if (c >= 0xd800 && c <= 0xdfff) c = 0xfffd;
            if (c < 0x80) out.push(c);
            else if (c < 0x800) out.push(0xc0 | (c >> 6), 0x80 | (c & 63));
            else if (c < 0x10000) out.push(0xe0 | (c >> 12), 0x80 | ((c >> 6) & 63), 0x80 | (c & 63));
            else out.push(0xf0 | (c >> 18), 0x80 | ((c >> 12) & 63), 0x80 | ((c >> 6) & 63), 0x80 | (c & 63));
        }
        return new Uint8Array(out);
    };
    globalThis.TextEncoder = class TextEncoder {
        get encoding() { return 'utf-8'; }
        encode(input) {
            const str = String(input === undefined ? '' : input);
            let utf8;
            try {
                utf8 = unescape(encodeURIComponent(str));
            } catch (_) {
                return encodeLossy(str);
            }
            const result = new Uint8Array(utf8.length);
            for (let i = 0; i < utf8.length; i++) result[i] = utf8.charCodeAt(i);
            return result;
        }
        encodeInto(str, dest) {
            const encoded = this.encode(str);
            const len = Math.min(encoded.length, dest.length);
            dest.set(encoded.subarray(0, len));
            return { read: str.length, written: len };
        }
    };
}
if (typeof globalThis.TextDecoder === 'undefined') {
    const decodeLossy = function (bytes) {
        let out = '';
        let i = 0;
        while (i < bytes.length) {
            const b = bytes[i];
            let need = 0, cp = 0, min = 0;
            if (b < 0x80) { out += String.fromCharCode(b); i++; continue; }
            if (b >= 0xc2 && b <= 0xdf) { need = 1; cp = b & 0x1f; min = 0x80; }
            else if (b >= 0xe0 && b <= 0xef) { need = 2; cp = b & 0x0f; min = 0x800; }
            else if (b >= 0xf0 && b <= 0xf4) { need = 3; cp = b & 0x07; min = 0x10000; }
            else { out += '\ufffd'; i++; continue; }
            let j = 1;
            while (j <= need && i + j < bytes.length && (bytes[i + j] & 0xc0) === 0x80) {
                cp = (cp << 6) | (bytes[i + j] & 0x3f);
                j++;
            }
            if (j <= need) { out += '\ufffd'; i += j; continue; }
            if (cp < min || cp > 0x10ffff || (cp >= 0xd800 && cp <= 0xdfff)) { out += '\ufffd'; i++; continue; }
            out += String.fromCodePoint(cp);
            i += j;
        }
        return out;
    };
    globalThis.TextDecoder = class TextDecoder {
        constructor(label = 'utf-8') { this.encoding = label.toLowerCase(); }
        decode(input) {
            if (!input) return '';
            const bytes = input instanceof Uint8Array ? input : new Uint8Array(input.buffer || input);
            let binary = '';
            for (let i = 0; i < bytes.length; i++) binary += String.fromCharCode(bytes[i]);
            try {
                return decodeURIComponent(escape(binary));
            } catch (_) {
                return decodeLossy(bytes);
            }
        }
    };
}
"#;

/// Builds the `process` shim for the given `NODE_ENV`.
pub fn process_polyfill(node_env: &str) -> String {
    // A JSON string literal is also a valid JS string literal.
    let node_env = serde_json::Value::String(node_env.to_string()).to_string();
    format!(
        "globalThis.process = {{ env: {{ NODE_ENV: {node_env} }}, nextTick: function (fn) {{ Promise.resolve().then(fn); }} }};\n"
    )
}

/// `NODE_ENV` value matching the bundle's production flag.
pub fn node_env(production: bool) -> &'static str {
    if production {
        "production"
    } else {
        "development"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_polyfill_sets_node_env() {
        let shim = process_polyfill("production");
        assert!(shim.contains(r#"NODE_ENV: "production""#));
    }

    #[test]
    fn test_process_polyfill_escapes_node_env() {
        let shim = process_polyfill("x\"; throw 1; \"");
        assert!(shim.contains(r#"NODE_ENV: "x\"; throw 1; \"""#));
    }

    #[test]
    fn test_node_env_follows_production_flag() {
        assert_eq!(node_env(true), "production");
        assert_eq!(node_env(false), "development");
    }
}
