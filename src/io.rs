// File-level helpers around the image API.
//
// Provides buffered reading and writing of HEX files and one-call loaders
// that resolve the CPU, declare variables and mount a HEX file.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use log::debug;

use crate::config::Meta;
use crate::cpu;
use crate::error::{Result, ResultExt};
use crate::image::Image;

/// Read every line of a HEX file, without line terminators.
pub fn read_hex_lines(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let path = path.as_ref();
    let describe = || format!("reading '{}'", path.display());

    let reader = BufReader::new(File::open(path).with_context(describe)?);
    let lines = reader
        .lines()
        .collect::<std::io::Result<Vec<_>>>()
        .with_context(describe)?;
    debug!("read {} lines from {}", lines.len(), path.display());
    Ok(lines)
}

/// Write HEX records, one per line, each terminated by a newline.
pub fn write_hex_lines<S: AsRef<str>>(path: impl AsRef<Path>, lines: &[S]) -> Result<()> {
    let path = path.as_ref();
    let describe = || format!("writing '{}'", path.display());

    let mut writer = BufWriter::new(File::create(path).with_context(describe)?);
    for line in lines {
        writeln!(writer, "{}", line.as_ref()).with_context(describe)?;
    }
    writer.flush().with_context(describe)?;
    debug!("wrote {} records to {}", lines.len(), path.display());
    Ok(())
}

/// Parse a YAML meta file.
pub fn load_meta(path: impl AsRef<Path>) -> Result<Meta> {
    let path = path.as_ref();
    let describe = || format!("meta file '{}'", path.display());
    let text = fs::read_to_string(path).with_context(describe)?;
    Meta::from_yaml(&text).with_context(describe)
}

/// Load `hex` using the CPU and variables declared in the `meta` file.
pub fn load_image(hex: impl AsRef<Path>, meta: impl AsRef<Path>) -> Result<Image> {
    let meta_path = meta.as_ref();
    let meta = load_meta(meta_path)?;
    let cpu = meta
        .cpu
        .resolve()
        .with_context(|| format!("meta file '{}'", meta_path.display()))?;
    let variables = meta
        .variables()
        .with_context(|| format!("meta file '{}'", meta_path.display()))?;
    mount(Image::new(cpu, variables)?, hex.as_ref())
}

/// Load `hex` for a catalog CPU, with no variables declared.
pub fn load_image_for_cpu(hex: impl AsRef<Path>, cpu_names: &str) -> Result<Image> {
    let cpu = cpu::resolve(cpu_names)?;
    mount(Image::new(cpu, Vec::new())?, hex.as_ref())
}

fn mount(mut image: Image, hex: &Path) -> Result<Image> {
    let lines = read_hex_lines(hex)?;
    image
        .mount_hex(&lines)
        .with_context(|| format!("hex file '{}'", hex.display()))?;
    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn hex_lines_roundtrip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("image.hex");
        let lines = [":0100000011EE", ":00000001FF"];
        write_hex_lines(&path, &lines).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), ":0100000011EE\n:00000001FF\n");
        assert_eq!(read_hex_lines(&path).unwrap(), lines);
    }

    #[test]
    fn missing_file_names_path() {
        let err = read_hex_lines("/nonexistent/firmware.hex").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(err.to_string().contains("/nonexistent/firmware.hex"));
    }

    #[test]
    fn loads_image_for_catalog_cpu() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("image.hex");
        write_hex_lines(&path, &[":020000040001F9", ":01000000AA55", ":00000001FF"]).unwrap();

        let image = load_image_for_cpu(&path, "p16f1516").unwrap();
        assert_eq!(image.map().read_byte(0x1_0000, None).unwrap(), Some(0xAA));
        assert!(image.variables().is_empty());
    }

    #[test]
    fn loads_image_with_meta() {
        let dir = tempfile::tempdir().unwrap();
        let hex = dir.path().join("image.hex");
        let meta = dir.path().join("meta.yaml");
        write_hex_lines(&hex, &[":01001000A04F", ":00000001FF"]).unwrap();
        fs::write(
            &meta,
            "meta:\n  cpu: pic16f1516\n  data:\n    v: { size: 1, type: u8, address: 0x10, value: 1, memory_name: flash }\n",
        )
        .unwrap();

        let image = load_image(&hex, &meta).unwrap();
        assert_eq!(
            image.get("v").unwrap(),
            Some(crate::variable::Value::Integer(0xA0))
        );
    }

    #[test]
    fn bad_hex_names_file_and_record() {
        let dir = tempfile::tempdir().unwrap();
        let hex = dir.path().join("bad.hex");
        write_hex_lines(&hex, &[":0100000011EF"]).unwrap();
        let err = load_image_for_cpu(&hex, "pic16f1516").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format);
        let text = err.to_string();
        assert!(text.contains("bad.hex"), "{text}");
        assert!(text.contains("hex record #1"), "{text}");
    }
}
