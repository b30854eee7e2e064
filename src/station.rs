//! Request frame encoders.
//!
//! Each single PLC that is connected on MELSECNET and CC-Link IE is called a
//! station. A [`Station`] knows how to address one and builds the hex-text
//! request frames for it; the frame version is fixed by the implementing
//! type, so callers pick 1E or 3E once and never branch on it afterwards.

use crate::device_code::DeviceCode;
use crate::error::McpError;
use crate::frame::{
    data_length_hex, le_hex, pack_bits, AccessRoute, FrameVersion, BIT_READ_SUB_COMMAND,
    BIT_WRITE_SUB_COMMAND, HEALTH_CHECK_COMMAND, HEALTH_CHECK_DATA, HEALTH_CHECK_SUBCOMMAND,
    MAX_BLOCKS_3E, MAX_OFFSET_3E, MAX_POINTS_1E, MONITORING_TIMER, MULTI_READ_COMMAND,
    READ_COMMAND, READ_SUB_COMMAND,
    SUB_HEADER_1E_BIT_READ, SUB_HEADER_1E_BIT_WRITE, SUB_HEADER_1E_LOOPBACK,
    SUB_HEADER_1E_WORD_READ, SUB_HEADER_1E_WORD_WRITE, SUB_HEADER_3E, WRITE_COMMAND,
    WRITE_SUB_COMMAND,
};
use crate::parser::{Parser, Parser1E, Parser3E};

/// Frame encoder for one addressing identity and one frame version.
///
/// `device` is a device class symbol like "D", `offset` the head device
/// number and `num_points` the number of devices to access. Word writes take
/// two bytes per point (already little-endian per word); bit writes take one
/// byte per point, non-zero meaning ON.
pub trait Station: Send + Sync {
    /// Parser for the replies to frames built by this station.
    type Parser: Parser;

    fn frame_version(&self) -> FrameVersion;

    fn parser(&self) -> Self::Parser;

    fn build_health_check_request(&self) -> Result<String, McpError>;

    fn build_read_request(
        &self,
        device: &str,
        offset: u32,
        num_points: u16,
    ) -> Result<String, McpError>;

    fn build_bit_read_request(
        &self,
        device: &str,
        offset: u32,
        num_points: u16,
    ) -> Result<String, McpError>;

    fn build_write_request(
        &self,
        device: &str,
        offset: u32,
        num_points: u16,
        data: &[u8],
    ) -> Result<String, McpError>;

    fn build_bit_write_request(
        &self,
        device: &str,
        offset: u32,
        num_points: u16,
        data: &[u8],
    ) -> Result<String, McpError>;

    /// Check a complete health-check reply against the echo that was sent.
    fn verify_health_check(&self, resp: &[u8]) -> Result<(), McpError>;
}

fn parse_hex_field(field: &'static str, value: &str, width: usize) -> Result<Vec<u8>, McpError> {
    if value.len() != width * 2 {
        return Err(McpError::InvalidStationField {
            field,
            value: value.to_string(),
        });
    }
    hex::decode(value).map_err(|_| McpError::InvalidStationField {
        field,
        value: value.to_string(),
    })
}

/// Exactly `2 * num_points` bytes of word data; excess is dropped.
fn word_payload(data: &[u8], num_points: u16) -> Result<&[u8], McpError> {
    let need = 2 * usize::from(num_points); // 2 byte per 1 device point
    if data.len() < need {
        return Err(McpError::WriteDataTooShort {
            expected: need,
            actual: data.len(),
        });
    }
    if data.len() > need {
        tracing::debug!(
            "write data has {} bytes, only the first {} are sent",
            data.len(),
            need
        );
    }
    Ok(&data[..need])
}

/// One byte per point, nibble-packed.
fn bit_payload(data: &[u8], num_points: u16) -> Result<Vec<u8>, McpError> {
    let need = usize::from(num_points);
    if data.len() < need {
        return Err(McpError::WriteDataTooShort {
            expected: need,
            actual: data.len(),
        });
    }
    Ok(pack_bits(&data[..need]))
}

/// 3E frame station.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Station3E {
    route: AccessRoute,
}

impl Station3E {
    /// Build a station from the textual hex fields as they appear on the
    /// wire, e.g. `("00", "FF", "FF03", "00")`.
    pub fn new(
        network_num: &str,
        pc_num: &str,
        unit_io_num: &str,
        unit_station_num: &str,
    ) -> Result<Self, McpError> {
        let network = parse_hex_field("network_num", network_num, 1)?;
        let pc = parse_hex_field("pc_num", pc_num, 1)?;
        let unit_io = parse_hex_field("unit_io_num", unit_io_num, 2)?;
        let unit_station = parse_hex_field("unit_station_num", unit_station_num, 1)?;
        Ok(Self {
            route: AccessRoute {
                network_number: network[0],
                pc_number: pc[0],
                io_number: u16::from_le_bytes([unit_io[0], unit_io[1]]),
                station_number: unit_station[0],
            },
        })
    }

    /// The station the Ethernet module is mounted on, without multidrop.
    #[must_use]
    pub fn local() -> Self {
        Self::from_route(AccessRoute::default())
    }

    #[must_use]
    pub const fn from_route(route: AccessRoute) -> Self {
        Self { route }
    }

    #[must_use]
    pub const fn route(&self) -> AccessRoute {
        self.route
    }

    #[must_use]
    pub fn network_num(&self) -> String {
        le_hex(u64::from(self.route.network_number), 1)
    }

    #[must_use]
    pub fn pc_num(&self) -> String {
        le_hex(u64::from(self.route.pc_number), 1)
    }

    #[must_use]
    pub fn unit_io_num(&self) -> String {
        le_hex(u64::from(self.route.io_number), 2)
    }

    #[must_use]
    pub fn unit_station_num(&self) -> String {
        le_hex(u64::from(self.route.station_number), 1)
    }

    /// Prefix the header and computed data length to `body`, which starts at
    /// the monitoring timer.
    fn frame(&self, body: &str) -> Result<String, McpError> {
        let data_len = data_length_hex(body)?;
        Ok(format!(
            "{SUB_HEADER_3E}{}{}{}{}{data_len}{body}",
            self.network_num(),
            self.pc_num(),
            self.unit_io_num(),
            self.unit_station_num(),
        ))
    }

    /// offset(3, LE) + device code + points(2, LE)
    fn device_spec(device: &str, offset: u32, num_points: u16) -> Result<String, McpError> {
        let device_code = DeviceCode::lookup(device)?;
        if offset > MAX_OFFSET_3E {
            return Err(McpError::OffsetOutOfRange {
                offset,
                max: MAX_OFFSET_3E,
            });
        }
        if num_points == 0 {
            return Err(McpError::InvalidPointCount {
                points: num_points,
                max: u16::MAX,
            });
        }
        // MELSEC-Q/L: 3 byte head device, iQ-R would need 4
        let offset_hex = le_hex(u64::from(offset), 3);
        let points = le_hex(u64::from(num_points), 2);
        Ok(format!("{offset_hex}{}{points}", device_code.hex()))
    }

    /// Multiple-block batch read (command 0406) of `(device, offset,
    /// num_points)` blocks.
    ///
    /// The frame lists all word-device blocks before the bit-device blocks,
    /// keeping the caller's order within each group, and the reply payload
    /// follows that same order. Bit-device blocks are read in word units, so
    /// one point there covers 16 bits.
    pub fn build_multi_read_request(&self, blocks: &[(&str, u32, u16)]) -> Result<String, McpError> {
        if blocks.is_empty() || blocks.len() > MAX_BLOCKS_3E {
            return Err(McpError::InvalidBlockCount {
                blocks: blocks.len(),
                max: MAX_BLOCKS_3E,
            });
        }
        let mut word_specs = String::new();
        let mut bit_specs = String::new();
        let (mut word_blocks, mut bit_blocks) = (0u64, 0u64);
        for (device, offset, num_points) in blocks {
            let spec = Self::device_spec(device, *offset, *num_points)?;
            if DeviceCode::lookup(device)?.is_bit() {
                bit_specs.push_str(&spec);
                bit_blocks += 1;
            } else {
                word_specs.push_str(&spec);
                word_blocks += 1;
            }
        }
        self.frame(&format!(
            "{MONITORING_TIMER}{MULTI_READ_COMMAND}{READ_SUB_COMMAND}{}{}{word_specs}{bit_specs}",
            le_hex(word_blocks, 1),
            le_hex(bit_blocks, 1)
        ))
    }

    fn build_read_request_helper(
        &self,
        device: &str,
        offset: u32,
        num_points: u16,
        sub_command: &str,
    ) -> Result<String, McpError> {
        let spec = Self::device_spec(device, offset, num_points)?;
        self.frame(&format!(
            "{MONITORING_TIMER}{READ_COMMAND}{sub_command}{spec}"
        ))
    }

    fn build_write_request_helper(
        &self,
        device: &str,
        offset: u32,
        num_points: u16,
        payload: &[u8],
        sub_command: &str,
    ) -> Result<String, McpError> {
        let spec = Self::device_spec(device, offset, num_points)?;
        let write_hex = hex::encode_upper(payload);
        self.frame(&format!(
            "{MONITORING_TIMER}{WRITE_COMMAND}{sub_command}{spec}{write_hex}"
        ))
    }
}

impl Default for Station3E {
    fn default() -> Self {
        Self::local()
    }
}

impl Station for Station3E {
    type Parser = Parser3E;

    fn frame_version(&self) -> FrameVersion {
        FrameVersion::ThreeE
    }

    fn parser(&self) -> Parser3E {
        Parser3E
    }

    fn build_health_check_request(&self) -> Result<String, McpError> {
        let return_data_num = le_hex(HEALTH_CHECK_DATA.len() as u64, 2); // "0500"
        let return_data = hex::encode_upper(HEALTH_CHECK_DATA);
        self.frame(&format!(
            "{MONITORING_TIMER}{HEALTH_CHECK_COMMAND}{HEALTH_CHECK_SUBCOMMAND}{return_data_num}{return_data}"
        ))
    }

    fn build_read_request(
        &self,
        device: &str,
        offset: u32,
        num_points: u16,
    ) -> Result<String, McpError> {
        self.build_read_request_helper(device, offset, num_points, READ_SUB_COMMAND)
    }

    fn build_bit_read_request(
        &self,
        device: &str,
        offset: u32,
        num_points: u16,
    ) -> Result<String, McpError> {
        self.build_read_request_helper(device, offset, num_points, BIT_READ_SUB_COMMAND)
    }

    fn build_write_request(
        &self,
        device: &str,
        offset: u32,
        num_points: u16,
        data: &[u8],
    ) -> Result<String, McpError> {
        let payload = word_payload(data, num_points)?;
        self.build_write_request_helper(device, offset, num_points, payload, WRITE_SUB_COMMAND)
    }

    fn build_bit_write_request(
        &self,
        device: &str,
        offset: u32,
        num_points: u16,
        data: &[u8],
    ) -> Result<String, McpError> {
        let payload = bit_payload(data, num_points)?;
        self.build_write_request_helper(
            device,
            offset,
            num_points,
            &payload,
            BIT_WRITE_SUB_COMMAND,
        )
    }

    fn verify_health_check(&self, resp: &[u8]) -> Result<(), McpError> {
        let fail = |reason| {
            Err(McpError::HealthCheck {
                reason,
                raw: resp.to_vec(),
            })
        };
        if resp.len() != 18 {
            return fail("unexpected response length");
        }
        if resp[0..2] != [0xD0, 0x00] {
            return fail("unexpected sub header");
        }
        if resp[2..7] != self.route.to_bytes() {
            return fail("access route not mirrored");
        }
        if resp[7..9] != [0x09, 0x00] {
            return fail("unexpected data length");
        }
        if resp[9..11] != [0x00, 0x00] {
            return fail("non-zero end code");
        }
        // number of echoed bytes
        if resp[11..13] != [0x05, 0x00] {
            return fail("return header mismatch");
        }
        if resp[13..18] != HEALTH_CHECK_DATA[..] {
            return fail("return body mismatch");
        }
        Ok(())
    }
}

/// 1E frame station. The format predates network addressing, so only the PC
/// number is carried.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Station1E {
    pc_number: u8,
}

impl Station1E {
    pub fn new(pc_num: &str) -> Result<Self, McpError> {
        let pc = parse_hex_field("pc_num", pc_num, 1)?;
        Ok(Self { pc_number: pc[0] })
    }

    #[must_use]
    pub const fn local() -> Self {
        Self { pc_number: 0xFF }
    }

    #[must_use]
    pub fn pc_num(&self) -> String {
        le_hex(u64::from(self.pc_number), 1)
    }

    /// head device(4, LE) + device code(2, LE) + points(1) + fixed 00
    fn device_spec(device: &str, offset: u32, num_points: u16) -> Result<String, McpError> {
        let device_code = DeviceCode::lookup(device)?;
        if num_points == 0 || num_points > MAX_POINTS_1E {
            return Err(McpError::InvalidPointCount {
                points: num_points,
                max: MAX_POINTS_1E,
            });
        }
        // 256 points is sent as 00
        let points = le_hex(u64::from(num_points % MAX_POINTS_1E), 1);
        Ok(format!(
            "{}{}{points}00",
            le_hex(u64::from(offset), 4),
            le_hex(u64::from(device_code.code_1e), 2)
        ))
    }

    fn build_request(
        &self,
        sub_header: &str,
        device: &str,
        offset: u32,
        num_points: u16,
        payload: &[u8],
    ) -> Result<String, McpError> {
        let spec = Self::device_spec(device, offset, num_points)?;
        Ok(format!(
            "{sub_header}{}{MONITORING_TIMER}{spec}{}",
            self.pc_num(),
            hex::encode_upper(payload)
        ))
    }
}

impl Default for Station1E {
    fn default() -> Self {
        Self::local()
    }
}

impl Station for Station1E {
    type Parser = Parser1E;

    fn frame_version(&self) -> FrameVersion {
        FrameVersion::OneE
    }

    fn parser(&self) -> Parser1E {
        Parser1E
    }

    fn build_health_check_request(&self) -> Result<String, McpError> {
        Ok(format!(
            "{SUB_HEADER_1E_LOOPBACK}{}{MONITORING_TIMER}{}{}",
            self.pc_num(),
            le_hex(HEALTH_CHECK_DATA.len() as u64, 1),
            hex::encode_upper(HEALTH_CHECK_DATA)
        ))
    }

    fn build_read_request(
        &self,
        device: &str,
        offset: u32,
        num_points: u16,
    ) -> Result<String, McpError> {
        self.build_request(SUB_HEADER_1E_WORD_READ, device, offset, num_points, &[])
    }

    fn build_bit_read_request(
        &self,
        device: &str,
        offset: u32,
        num_points: u16,
    ) -> Result<String, McpError> {
        self.build_request(SUB_HEADER_1E_BIT_READ, device, offset, num_points, &[])
    }

    fn build_write_request(
        &self,
        device: &str,
        offset: u32,
        num_points: u16,
        data: &[u8],
    ) -> Result<String, McpError> {
        let payload = word_payload(data, num_points)?;
        self.build_request(SUB_HEADER_1E_WORD_WRITE, device, offset, num_points, payload)
    }

    fn build_bit_write_request(
        &self,
        device: &str,
        offset: u32,
        num_points: u16,
        data: &[u8],
    ) -> Result<String, McpError> {
        let payload = bit_payload(data, num_points)?;
        self.build_request(SUB_HEADER_1E_BIT_WRITE, device, offset, num_points, &payload)
    }

    fn verify_health_check(&self, resp: &[u8]) -> Result<(), McpError> {
        let fail = |reason| {
            Err(McpError::HealthCheck {
                reason,
                raw: resp.to_vec(),
            })
        };
        if resp.len() != 8 {
            return fail("unexpected response length");
        }
        if resp[0] != 0x96 {
            return fail("unexpected sub header");
        }
        if resp[1] != 0x00 {
            return fail("non-zero end code");
        }
        if resp[2] != 0x05 {
            return fail("return header mismatch");
        }
        if resp[3..8] != HEALTH_CHECK_DATA[..] {
            return fail("return body mismatch");
        }
        Ok(())
    }
}
