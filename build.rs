use std::fs;

fn main() {
    // The device table is embedded with include_str! and parsed lazily at
    // runtime. Parse it here as well so a malformed table fails the build
    // instead of silently producing an empty table.
    println!("cargo:rerun-if-changed=src/devices.toml");
    let s = match fs::read_to_string("src/devices.toml") {
        Ok(s) => s,
        Err(e) => panic!("cannot read src/devices.toml: {e}"),
    };
    let table: toml::Table = match s.parse() {
        Ok(t) => t,
        Err(e) => panic!("src/devices.toml is not valid TOML: {e}"),
    };
    let Some(devices) = table.get("device").and_then(|v| v.as_array()) else {
        panic!("src/devices.toml has no [[device]] entries");
    };
    for d in devices {
        let symbol = d.get("symbol").and_then(|v| v.as_str());
        let code = d.get("code").and_then(|v| v.as_integer());
        let code_1e = d.get("code_1e").and_then(|v| v.as_integer());
        match (symbol, code, code_1e) {
            (Some(_), Some(c), Some(c1)) if (0..=0xFF).contains(&c) && (0..=0xFFFF).contains(&c1) => {}
            _ => panic!("invalid [[device]] entry in src/devices.toml: {d}"),
        }
    }
}
