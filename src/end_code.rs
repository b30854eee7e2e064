//! Short descriptions for end codes commonly returned by Q/L series CPUs and
//! Ethernet modules. Unknown codes have no description; the numeric value is
//! still reported by `McpError::EndCode`.

pub const END_OK: u16 = 0x0000;

/// Return a short static description for a known end code, or None if unknown.
#[must_use]
pub const fn end_code_description(code: u16) -> Option<&'static str> {
    match code {
        END_OK => Some("normal completion"),
        0x0055 => Some("online change disabled while RUN"),
        0xC050 => Some("ASCII data that cannot be converted to binary received"),
        0xC051..=0xC054 => Some("number of read/write points out of range"),
        0xC056 => Some("read/write request exceeds the maximum address"),
        0xC058 => Some("request data length does not match the character count"),
        0xC059 => Some("command or subcommand specified incorrectly"),
        0xC05B => Some("CPU cannot read/write the specified device"),
        0xC05C => Some("request contents are incorrect"),
        0xC05F => Some("request cannot be executed for the target CPU"),
        0xC060 => Some("request contents are incorrect for bit devices"),
        0xC061 => Some("request data length does not match the number of data"),
        0xC06F => Some("communication data code setting mismatch (ASCII/binary)"),
        0xC0D8 => Some("number of blocks exceeds the range"),
        _ => None,
    }
}

pub(crate) fn describe_suffix(code: &u16) -> String {
    end_code_description(*code).map_or_else(String::new, |d| format!(" ({d})"))
}
