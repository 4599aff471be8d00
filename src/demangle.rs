use rustc_demangle::try_demangle;

/// Produce a display name for a raw kernel label.
///
/// Kernels launched without an explicit label arrive as the functor's
/// mangled type name, optionally suffixed with "/<tag type>" when the launch
/// carried a dispatch tag. A `/` at position zero is not a separator; the
/// string is then demangled as a whole. Anything that does not demangle
/// passes through unchanged, including the empty string.
pub fn display_name(raw: &str) -> String {
    match raw.find('/') {
        Some(pos) if pos > 0 => {
            let functor = demangle_one(&raw[..pos]);
            let tag = demangle_one(&raw[pos + 1..]);
            format!("{functor}/{tag}")
        }
        _ => demangle_one(raw),
    }
}

fn demangle_one(symbol: &str) -> String {
    match try_demangle(symbol) {
        // Alternate form drops the trailing disambiguator hash.
        Ok(demangled) => format!("{demangled:#}"),
        Err(_) => symbol.to_string(),
    }
}
