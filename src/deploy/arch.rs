//! CPU architecture normalisation.

/// Maps `uname -m` and Docker architecture names onto one token per family.
///
/// Matching ignores case and surrounding whitespace. Unknown values pass
/// through trimmed and lower-cased, so the function is idempotent.
///
/// ```
/// # use onctl::deploy::normalize_arch;
/// assert_eq!(normalize_arch(" AArch64 "), "arm64");
/// assert_eq!(normalize_arch("x86_64"), "amd64");
/// assert_eq!(normalize_arch("riscv64"), "riscv64");
/// ```
#[must_use]
pub fn normalize_arch(raw: &str) -> String {
    let lowered = raw.trim().to_ascii_lowercase();
    let family = match lowered.as_str() {
        "x86_64" | "amd64" => "amd64",
        "aarch64" | "arm64" => "arm64",
        "armv7l" | "arm" => "arm",
        "i386" | "i686" | "386" => "386",
        _ => return lowered,
    };
    family.to_owned()
}
