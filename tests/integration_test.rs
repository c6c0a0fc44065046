use serde_json::json;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use xclbin::error::XclBinError;
use xclbin::header::AXLF_HEADER_SIZE;
use xclbin::layout::SectionHeaderEntry;
use xclbin::param::ParameterSectionData;
use xclbin::section::SectionKind;
use xclbin::xclbin::{ReadOptions, WriteOptions, XclBin};

fn psd(text: &str) -> ParameterSectionData {
    ParameterSectionData::parse(text).unwrap()
}

fn write_file(dir: &TempDir, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, bytes).unwrap();
    path
}

fn section_tuples(xb: &XclBin) -> Vec<(SectionKind, String, String, Vec<u8>)> {
    xb.sections()
        .iter()
        .map(|s| (s.kind(), s.name().to_owned(), s.index_name().to_owned(), s.image().to_vec()))
        .collect()
}

/// A container with raw, JSON, indexed and sub-sectioned content.
fn populated(dir: &TempDir) -> XclBin {
    let bit = write_file(dir, "design.bit", &[0xA5; 13]);
    let fw = write_file(dir, "sched.bin", b"firmware");
    let mem = write_file(dir, "mem.json", serde_json::to_string(&json!({
        "mem_topology": { "m_count": "2", "m_mem_data": [{ "m_tag": "DDR[0]" }, { "m_tag": "DDR[1]" }] }
    })).unwrap().as_bytes());
    let lib = write_file(dir, "kern.so", b"\x7fELF kernel object");

    let mut xb = XclBin::new();
    xb.add_section(&psd(&format!("BITSTREAM:RAW:{}", bit.display()))).unwrap();
    xb.add_section(&psd(&format!("SCHED_FIRMWARE:raw:{}", fw.display()))).unwrap();
    xb.add_section(&psd(&format!("MEM_TOPOLOGY:JSON:{}", mem.display()))).unwrap();
    xb.add_ps_kernel(&format!("vadd:2:{}", lib.display())).unwrap();
    xb.set_key_value("USER:owner:lab").unwrap();
    xb
}

fn write_to_disk(xb: &mut XclBin, dir: &TempDir, name: &str) -> PathBuf {
    let path = dir.path().join(name);
    xb.write(&path, WriteOptions::default()).unwrap();
    path
}

#[test]
fn test_write_read_roundtrip() {
    let dir = TempDir::new().unwrap();
    let mut xb = populated(&dir);
    let path = write_to_disk(&mut xb, &dir, "out.xclbin");

    let back = XclBin::read(&path, ReadOptions::default()).unwrap();
    assert_eq!(back.header(), xb.header());
    assert_eq!(section_tuples(&back), section_tuples(&xb));
    assert_eq!(back.find_section(SectionKind::SoftKernel, "vadd").unwrap().name(), "vadd");
    assert_eq!(back.user_key_value("owner").as_deref(), Some("lab"));
}

#[test]
fn test_migration_ignores_binary_header() {
    let dir = TempDir::new().unwrap();
    let mut xb = populated(&dir);
    let path = write_to_disk(&mut xb, &dir, "out.xclbin");
    let direct = XclBin::read(&path, ReadOptions::default()).unwrap();

    let mut bytes = fs::read(&path).unwrap();
    bytes[..AXLF_HEADER_SIZE as usize].fill(0);
    let migrated = XclBin::read_from(&mut Cursor::new(bytes), ReadOptions { migrate: true }).unwrap();

    assert_eq!(migrated.header(), direct.header());
    assert_eq!(section_tuples(&migrated), section_tuples(&direct));
}

#[test]
fn test_alignment_and_length() {
    let dir = TempDir::new().unwrap();
    let mut xb = populated(&dir);
    let path = write_to_disk(&mut xb, &dir, "out.xclbin");
    let bytes = fs::read(&path).unwrap();

    assert_eq!(xb.header().header.length, bytes.len() as u64);
    let count = xb.sections().len();
    let mut table = Cursor::new(&bytes[AXLF_HEADER_SIZE as usize..]);
    let entries: Vec<SectionHeaderEntry> =
        (0..count).map(|_| SectionHeaderEntry::read(&mut table).unwrap()).collect();

    for pair in entries.windows(2) {
        assert!(pair[1].offset >= pair[0].offset + pair[0].size);
    }
    for (entry, section) in entries.iter().zip(xb.sections().iter()) {
        assert_eq!(entry.offset % 8, 0);
        assert_eq!(entry.kind, section.kind().as_u32());
        let start = entry.offset as usize;
        assert_eq!(&bytes[start..start + entry.size as usize], section.image());
    }
}

#[test]
fn test_skip_uuid_insertion() {
    let dir = TempDir::new().unwrap();
    let mut xb = populated(&dir);
    xb.set_key_value("SYS:XclbinUUID:00112233-4455-6677-8899-aabbccddeeff").unwrap();
    let path = dir.path().join("keep.xclbin");
    xb.write(&path, WriteOptions { skip_uuid_insertion: true, ..Default::default() }).unwrap();
    let back = XclBin::read(&path, ReadOptions::default()).unwrap();
    assert_eq!(hex::encode(back.header().header.uuid), "00112233445566778899aabbccddeeff");
}

#[test]
fn test_pretty_mirror_still_migrates() {
    let dir = TempDir::new().unwrap();
    let mut xb = populated(&dir);
    let path = dir.path().join("pretty.xclbin");
    xb.write(&path, WriteOptions { pretty_mirror: true, ..Default::default() }).unwrap();
    let migrated = XclBin::read(&path, ReadOptions { migrate: true }).unwrap();
    assert_eq!(section_tuples(&migrated), section_tuples(&xb));
}

#[test]
fn test_user_key_value_idempotent() {
    let mut xb = XclBin::new();
    xb.set_key_value("USER:k:v1").unwrap();
    xb.set_key_value("USER:k:v2").unwrap();
    assert_eq!(xb.user_key_value("k").as_deref(), Some("v2"));

    xb.remove_key("k").unwrap();
    let err = xb.remove_key("k").unwrap_err();
    assert!(matches!(err, XclBinError::MissingKey(_)));
    assert_eq!(err.to_string(), "Key 'k' not found.");
}

#[test]
fn test_build_metadata_updates_header() {
    let dir = TempDir::new().unwrap();
    let meta = write_file(&dir, "build.json", serde_json::to_string(&json!({
        "build_metadata": { "dsa": { "feature_roms": [{
            "timeSinceEpoch": "100",
            "uuid": "aabbccdd-eeff-0011-2233-445566778899",
            "vbnvName": "platform1"
        }] } }
    })).unwrap().as_bytes());

    let mut xb = XclBin::new();
    xb.add_section(&psd(&format!("BUILD_METADATA:JSON:{}", meta.display()))).unwrap();
    let h = &xb.header().header;
    assert_eq!(h.feature_rom_time_stamp, 100);
    assert_eq!(hex::encode(h.rom_uuid), "aabbccddeeff00112233445566778899");
    assert_eq!(h.platform_vbnv_str(), "platform1");
}

#[test]
fn test_remove_with_index_on_plain_kind() {
    let dir = TempDir::new().unwrap();
    let mut xb = populated(&dir);
    assert!(matches!(
        xb.remove_section("BITSTREAM[x]"),
        Err(XclBinError::UnsupportedIndexUsage(_))
    ));
    assert!(matches!(
        xb.remove_section("SOFT_KERNEL"),
        Err(XclBinError::UnsupportedIndexUsage(_))
    ));
    xb.remove_section("SOFT_KERNEL[vadd]").unwrap();
    assert!(xb.find_section(SectionKind::SoftKernel, "vadd").is_none());
}

#[test]
fn test_ps_kernel_library_must_exist() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("lib.so");
    let mut xb = XclBin::new();
    let err = xb.add_ps_kernel(&format!("foo:3:{}", missing.display())).unwrap_err();
    assert!(matches!(err, XclBinError::FileOpen { .. }));
    assert!(err.to_string().contains(&missing.display().to_string()));

    fs::write(&missing, b"shared object").unwrap();
    xb.add_ps_kernel(&format!("foo:3:{}", missing.display())).unwrap();
    assert_eq!(xb.sections().len(), 1);

    let out = dir.path().join("metadata.json");
    xb.dump_section(&psd(&format!("SOFT_KERNEL[foo]-METADATA:JSON:{}", out.display()))).unwrap();
    let md: serde_json::Value = serde_json::from_slice(&fs::read(&out).unwrap()).unwrap();
    assert_eq!(md["soft_kernel_metadata"]["m_num_instances"], "3");
    assert_eq!(md["soft_kernel_metadata"]["mpo_symbol_name"], "foo");

    let obj = dir.path().join("obj.so");
    xb.dump_section(&psd(&format!("SOFT_KERNEL[foo]-OBJ:RAW:{}", obj.display()))).unwrap();
    assert_eq!(fs::read(&obj).unwrap(), b"shared object");
}

#[test]
fn test_migrate_bad_mirror_json() {
    let mut bytes = vec![0u8; 600];
    bytes.extend_from_slice(b"XCLBIN_MIRROR_DATA_START{\n\"schema_version\": {},\n\"header\": oops\n}");
    bytes.extend_from_slice(b"XCLBIN_MIRROR_DATA_END");
    match XclBin::read_from(&mut Cursor::new(bytes), ReadOptions { migrate: true }) {
        Err(XclBinError::JsonParse { line, .. }) => assert_eq!(line, 3),
        other => panic!("expected a JSON parse error, got {other:?}"),
    }
}

#[test]
fn test_migrate_without_mirror() {
    let mut bytes = vec![0u8; 600];
    assert!(matches!(
        XclBin::read_from(&mut Cursor::new(bytes.clone()), ReadOptions { migrate: true }),
        Err(XclBinError::MissingMirrorData)
    ));
    bytes.extend_from_slice(b"XCLBIN_MIRROR_DATA_START{}");
    assert!(matches!(
        XclBin::read_from(&mut Cursor::new(bytes), ReadOptions { migrate: true }),
        Err(XclBinError::MalformedMirrorData)
    ));
}

#[test]
fn test_truncated_and_corrupt_inputs() {
    let dir = TempDir::new().unwrap();
    let mut xb = populated(&dir);
    let path = write_to_disk(&mut xb, &dir, "out.xclbin");
    let bytes = fs::read(&path).unwrap();

    let short = &bytes[..100];
    assert!(matches!(
        XclBin::read_from(&mut Cursor::new(short.to_vec()), ReadOptions::default()),
        Err(XclBinError::TruncatedInput { .. })
    ));

    let mut bad = bytes.clone();
    bad[..7].copy_from_slice(b"garbage");
    assert!(matches!(
        XclBin::read_from(&mut Cursor::new(bad), ReadOptions::default()),
        Err(XclBinError::BadMagic { .. })
    ));

    assert!(matches!(
        XclBin::read(Path::new("/no/such/dir/in.xclbin"), ReadOptions::default()),
        Err(XclBinError::FileOpen { .. })
    ));
}

#[test]
fn test_edit_cycle_on_disk() {
    let dir = TempDir::new().unwrap();
    let mut xb = populated(&dir);
    let first = write_to_disk(&mut xb, &dir, "first.xclbin");

    let mut xb = XclBin::read(&first, ReadOptions::default()).unwrap();
    let extra = write_file(&dir, "more.json", serde_json::to_string(&json!({
        "mem_topology": { "m_mem_data": [{ "m_tag": "HBM[0]" }] }
    })).unwrap().as_bytes());
    xb.add_merge_section(&psd(&format!("MEM_TOPOLOGY:JSON:{}", extra.display()))).unwrap();
    xb.remove_section("SCHED_FIRMWARE").unwrap();
    let second = write_to_disk(&mut xb, &dir, "second.xclbin");

    let back = XclBin::read(&second, ReadOptions::default()).unwrap();
    assert!(back.find_section(SectionKind::SchedFirmware, "").is_none());
    let out = dir.path().join("mem.out.json");
    back.dump_section(&psd(&format!("MEM_TOPOLOGY:JSON:{}", out.display()))).unwrap();
    let mem: serde_json::Value = serde_json::from_slice(&fs::read(&out).unwrap()).unwrap();
    assert_eq!(mem["mem_topology"]["m_mem_data"].as_array().unwrap().len(), 3);
    assert_eq!(mem["mem_topology"]["m_count"], "2");
}
