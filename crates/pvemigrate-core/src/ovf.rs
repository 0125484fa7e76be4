//! OVF descriptor reading.
//!
//! Only what is needed to size the destination VM is extracted: its CPU
//! count and memory, and the files it references.

use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::{Error, Result};

/// CIM resource type of a processor item.
const RESOURCE_CPU: u32 = 3;
/// CIM resource type of a memory item.
const RESOURCE_MEMORY: u32 = 4;

/// Hardware summary read from an OVF descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OvfSummary {
    /// Number of virtual CPUs.
    pub cpus: Option<u32>,
    /// Memory in megabytes.
    pub memory_mb: Option<u64>,
    /// `ovf:href` of every File in References.
    pub files: Vec<String>,
}

#[derive(Debug, Default)]
struct Item {
    resource_type: Option<u32>,
    quantity: Option<u64>,
    units: Option<String>,
}

/// Scale factor from an `AllocationUnits` string to megabytes.
///
/// Understands the `byte * 2^N` form and the common named units.
fn megabyte_factor(units: &str) -> Option<f64> {
    let compact: String = units.chars().filter(|c| !c.is_whitespace()).collect();
    let compact = compact.to_ascii_lowercase();

    if let Some(exp) = compact.strip_prefix("byte*2^") {
        let exp: i32 = exp.parse().ok()?;
        return Some(2f64.powi(exp - 20));
    }
    match compact.as_str() {
        "byte" | "bytes" => Some(1.0 / (1024.0 * 1024.0)),
        "kilobytes" | "kb" => Some(1.0 / 1024.0),
        "megabytes" | "mb" => Some(1.0),
        "gigabytes" | "gb" => Some(1024.0),
        _ => None,
    }
}

fn attr_value(e: &BytesStart<'_>, local: &[u8]) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr.map_err(|e| Error::ovf(e.to_string()))?;
        if attr.key.local_name().as_ref() == local {
            let value = attr.unescape_value().map_err(|e| Error::ovf(e.to_string()))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

impl OvfSummary {
    fn apply(&mut self, item: Item) {
        match (item.resource_type, item.quantity) {
            (Some(RESOURCE_CPU), Some(quantity)) => {
                self.cpus = u32::try_from(quantity).ok();
            }
            (Some(RESOURCE_MEMORY), Some(quantity)) => {
                let factor = item
                    .units
                    .as_deref()
                    .and_then(megabyte_factor)
                    .unwrap_or(1.0);
                self.memory_mb = Some((quantity as f64 * factor).round() as u64);
            }
            _ => {}
        }
    }
}

/// Parse OVF descriptor XML.
pub fn parse_ovf_content(content: &str) -> Result<OvfSummary> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut summary = OvfSummary::default();
    let mut item: Option<Item> = None;
    let mut current: Option<Vec<u8>> = None;

    loop {
        let event = reader.read_event().map_err(|e| {
            Error::ovf(format!("at position {}: {}", reader.buffer_position(), e))
        })?;

        match event {
            Event::Start(e) | Event::Empty(e) => {
                let local = e.local_name().as_ref().to_vec();
                match local.as_slice() {
                    b"File" => {
                        if let Some(href) = attr_value(&e, b"href")? {
                            summary.files.push(href);
                        }
                    }
                    b"Item" => item = Some(Item::default()),
                    _ => {}
                }
                current = Some(local);
            }
            Event::Text(t) => {
                let (Some(item), Some(tag)) = (item.as_mut(), current.as_deref()) else {
                    continue;
                };
                let text = String::from_utf8_lossy(t.as_ref());
                let text = text.trim();
                match tag {
                    b"ResourceType" => item.resource_type = text.parse().ok(),
                    b"VirtualQuantity" => item.quantity = text.parse().ok(),
                    b"AllocationUnits" => item.units = Some(text.to_string()),
                    _ => {}
                }
            }
            Event::End(e) => {
                if e.local_name().as_ref() == b"Item" {
                    if let Some(done) = item.take() {
                        summary.apply(done);
                    }
                }
                current = None;
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(summary)
}

/// Parse the OVF descriptor at `path`.
pub fn parse_ovf(path: &Path) -> Result<OvfSummary> {
    let content = std::fs::read_to_string(path).map_err(|e| Error::io(e, path))?;
    parse_ovf_content(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DESCRIPTOR: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Envelope vmw:buildId="build-123" xmlns="http://schemas.dmtf.org/ovf/envelope/1"
    xmlns:ovf="http://schemas.dmtf.org/ovf/envelope/1"
    xmlns:rasd="http://schemas.dmtf.org/wbem/wscim/1/cim-schema/2/CIM_ResourceAllocationSettingData"
    xmlns:vmw="http://www.vmware.com/schema/ovf">
  <References>
    <File ovf:href="web01-disk1.vmdk" ovf:id="file1" ovf:size="1073741824"/>
  </References>
  <DiskSection>
    <Info>Virtual disk information</Info>
    <Disk ovf:capacity="32" ovf:capacityAllocationUnits="byte * 2^30" ovf:diskId="vmdisk1" ovf:fileRef="file1"/>
  </DiskSection>
  <VirtualSystem ovf:id="web01">
    <Info>A virtual machine</Info>
    <VirtualHardwareSection>
      <Item>
        <rasd:AllocationUnits>hertz * 10^6</rasd:AllocationUnits>
        <rasd:ElementName>4 virtual CPU(s)</rasd:ElementName>
        <rasd:ResourceType>3</rasd:ResourceType>
        <rasd:VirtualQuantity>4</rasd:VirtualQuantity>
      </Item>
      <Item>
        <rasd:AllocationUnits>byte * 2^20</rasd:AllocationUnits>
        <rasd:ElementName>8192MB of memory</rasd:ElementName>
        <rasd:ResourceType>4</rasd:ResourceType>
        <rasd:VirtualQuantity>8192</rasd:VirtualQuantity>
      </Item>
      <Item>
        <rasd:ElementName>Hard disk 1</rasd:ElementName>
        <rasd:HostResource>ovf:/disk/vmdisk1</rasd:HostResource>
        <rasd:ResourceType>17</rasd:ResourceType>
      </Item>
    </VirtualHardwareSection>
  </VirtualSystem>
</Envelope>"#;

    #[test]
    fn test_parse_descriptor() {
        let summary = parse_ovf_content(DESCRIPTOR).unwrap();
        assert_eq!(summary.cpus, Some(4));
        assert_eq!(summary.memory_mb, Some(8192));
        assert_eq!(summary.files, vec!["web01-disk1.vmdk".to_string()]);
    }

    #[test]
    fn test_memory_in_gigabytes() {
        let xml = r#"<Envelope xmlns:rasd="r"><VirtualSystem id="x"><Item>
            <rasd:AllocationUnits>byte * 2^30</rasd:AllocationUnits>
            <rasd:ResourceType>4</rasd:ResourceType>
            <rasd:VirtualQuantity>2</rasd:VirtualQuantity>
        </Item></VirtualSystem></Envelope>"#;
        let summary = parse_ovf_content(xml).unwrap();
        assert_eq!(summary.memory_mb, Some(2048));
    }

    #[test]
    fn test_missing_hardware() {
        let summary = parse_ovf_content("<Envelope/>").unwrap();
        assert_eq!(summary, OvfSummary::default());
    }

    #[test]
    fn test_malformed_xml() {
        let err = parse_ovf_content("<Envelope><VirtualSystem></Envelope>").unwrap_err();
        assert!(matches!(err, Error::Ovf { .. }));
    }

    #[test]
    fn test_megabyte_factor() {
        assert_eq!(megabyte_factor("byte * 2^20"), Some(1.0));
        assert_eq!(megabyte_factor("byte * 2^30"), Some(1024.0));
        assert_eq!(megabyte_factor("MegaBytes"), Some(1.0));
        assert_eq!(megabyte_factor("hertz * 10^6"), None);
    }
}
