//! ROCm kernel metadata: the logical tree shared by the YAML-like text
//! flavor and the MsgPack flavor, with a MsgPack writer that produces
//! the minimal encoding and a parser that round-trips it.

use super::msgpack::{self, Value};
use super::{AccessQual, AddressSpace, KernelArg, ValueKind, ValueType};
use crate::error::BinaryError;

#[derive(Debug, Clone, PartialEq, Default)]
/// One kernel's metadata record
pub struct RocmKernel {
    /// Kernel name
    pub name: String,
    /// Symbol name of the kernel descriptor
    pub symbol_name: String,
    /// Source language
    pub language: String,
    /// Source language version
    pub language_version: [u32; 2],
    /// Kernel arguments, hidden ones included
    pub args: Vec<KernelArg>,
    /// Group (LDS) segment size
    pub group_segment_size: u64,
    /// Private (scratch) segment size
    pub private_segment_size: u64,
    /// Kernel-argument segment size
    pub kernarg_segment_size: u64,
    /// Kernel-argument segment alignment
    pub kernarg_segment_align: u64,
    /// Wavefront size
    pub wavefront_size: u64,
    /// Allocated SGPRs
    pub sgprs_num: u64,
    /// Allocated VGPRs
    pub vgprs_num: u64,
    /// Spilled SGPRs
    pub spilled_sgprs: u64,
    /// Spilled VGPRs
    pub spilled_vgprs: u64,
    /// Largest flat workgroup the kernel supports
    pub max_flat_work_group_size: u64,
    /// Required workgroup size, all zero when unconstrained
    pub reqd_work_group_size: [u32; 3],
    /// Hinted workgroup size, all zero when absent
    pub work_group_size_hint: [u32; 3],
    /// Vector type hint
    pub vec_type_hint: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
/// The whole metadata document
pub struct RocmMetadata {
    /// Format version pair
    pub version: [u32; 2],
    /// Printf format descriptors
    pub printf_infos: Vec<String>,
    /// Kernel records
    pub kernels: Vec<RocmKernel>,
}

fn value_kind_name(kind: ValueKind) -> &'static str {
    use ValueKind::*;
    match kind {
        ByValue => "by_value",
        GlobalBuffer => "global_buffer",
        DynSharedPointer => "dynamic_shared_pointer",
        Sampler => "sampler",
        Image => "image",
        Pipe => "pipe",
        Queue => "queue",
        HiddenGlobalOffsetX => "hidden_global_offset_x",
        HiddenGlobalOffsetY => "hidden_global_offset_y",
        HiddenGlobalOffsetZ => "hidden_global_offset_z",
        HiddenNone => "hidden_none",
        HiddenPrintfBuffer => "hidden_printf_buffer",
        HiddenDefaultQueue => "hidden_default_queue",
        HiddenCompletionAction => "hidden_completion_action",
        HiddenMultigridSyncArg => "hidden_multigrid_sync_arg",
    }
}

fn value_kind_of_name(name: &str) -> Result<ValueKind, BinaryError> {
    use ValueKind::*;
    Ok(match name {
        "by_value" => ByValue,
        "global_buffer" => GlobalBuffer,
        "dynamic_shared_pointer" => DynSharedPointer,
        "sampler" => Sampler,
        "image" => Image,
        "pipe" => Pipe,
        "queue" => Queue,
        "hidden_global_offset_x" => HiddenGlobalOffsetX,
        "hidden_global_offset_y" => HiddenGlobalOffsetY,
        "hidden_global_offset_z" => HiddenGlobalOffsetZ,
        "hidden_none" => HiddenNone,
        "hidden_printf_buffer" => HiddenPrintfBuffer,
        "hidden_default_queue" => HiddenDefaultQueue,
        "hidden_completion_action" => HiddenCompletionAction,
        "hidden_multigrid_sync_arg" => HiddenMultigridSyncArg,
        _ => {
            return Err(BinaryError::Malformed {
                what: "kernel argument value kind",
            })
        }
    })
}

fn value_type_name(vt: ValueType) -> &'static str {
    use ValueType::*;
    match vt {
        Structure => "struct",
        I8 => "i8",
        U8 => "u8",
        I16 => "i16",
        U16 => "u16",
        F16 => "f16",
        I32 => "i32",
        U32 => "u32",
        F32 => "f32",
        I64 => "i64",
        U64 => "u64",
        F64 => "f64",
    }
}

fn value_type_of_name(name: &str) -> Result<ValueType, BinaryError> {
    use ValueType::*;
    Ok(match name {
        "struct" => Structure,
        "i8" => I8,
        "u8" => U8,
        "i16" => I16,
        "u16" => U16,
        "f16" => F16,
        "i32" => I32,
        "u32" => U32,
        "f32" => F32,
        "i64" => I64,
        "u64" => U64,
        "f64" => F64,
        _ => {
            return Err(BinaryError::Malformed {
                what: "kernel argument value type",
            })
        }
    })
}

fn address_space_name(space: AddressSpace) -> &'static str {
    use AddressSpace::*;
    match space {
        None => "none",
        Private => "private",
        Global => "global",
        Constant => "constant",
        Local => "local",
        Generic => "generic",
        Region => "region",
    }
}

fn address_space_of_name(name: &str) -> AddressSpace {
    use AddressSpace::*;
    match name {
        "private" => Private,
        "global" => Global,
        "constant" => Constant,
        "local" => Local,
        "generic" => Generic,
        "region" => Region,
        _ => None,
    }
}

fn access_name(access: AccessQual) -> &'static str {
    match access {
        AccessQual::Default => "default",
        AccessQual::ReadOnly => "read_only",
        AccessQual::WriteOnly => "write_only",
        AccessQual::ReadWrite => "read_write",
    }
}

fn access_of_name(name: &str) -> AccessQual {
    match name {
        "read_only" => AccessQual::ReadOnly,
        "write_only" => AccessQual::WriteOnly,
        "read_write" => AccessQual::ReadWrite,
        _ => AccessQual::Default,
    }
}

fn str_val(text: &str) -> Value {
    Value::Str(text.to_string())
}

fn entry(key: &str, value: Value) -> (Value, Value) {
    (str_val(key), value)
}

fn arg_to_value(arg: &KernelArg) -> Value {
    let mut map = Vec::new();
    if !arg.name.is_empty() {
        map.push(entry(".name", str_val(&arg.name)));
    }
    if !arg.type_name.is_empty() {
        map.push(entry(".type_name", str_val(&arg.type_name)));
    }
    map.push(entry(".size", Value::Uint(arg.size)));
    map.push(entry(".offset", Value::Uint(arg.offset)));
    map.push(entry(".value_kind", str_val(value_kind_name(arg.value_kind))));
    map.push(entry(".value_type", str_val(value_type_name(arg.value_type))));
    if arg.pointee_align != 0 {
        map.push(entry(".pointee_align", Value::Uint(arg.pointee_align)));
    }
    if arg.address_space != AddressSpace::None {
        map.push(entry(
            ".address_space",
            str_val(address_space_name(arg.address_space)),
        ));
    }
    if arg.access != AccessQual::Default {
        map.push(entry(".access", str_val(access_name(arg.access))));
    }
    if arg.actual_access != AccessQual::Default {
        map.push(entry(
            ".actual_access",
            str_val(access_name(arg.actual_access)),
        ));
    }
    if arg.is_const {
        map.push(entry(".is_const", Value::Bool(true)));
    }
    if arg.is_restrict {
        map.push(entry(".is_restrict", Value::Bool(true)));
    }
    if arg.is_volatile {
        map.push(entry(".is_volatile", Value::Bool(true)));
    }
    if arg.is_pipe {
        map.push(entry(".is_pipe", Value::Bool(true)));
    }
    Value::Map(map)
}

fn kernel_to_value(kernel: &RocmKernel) -> Value {
    let mut map = vec![
        entry(".name", str_val(&kernel.name)),
        entry(".symbol", str_val(&kernel.symbol_name)),
    ];
    if !kernel.language.is_empty() {
        map.push(entry(".language", str_val(&kernel.language)));
        map.push(entry(
            ".language_version",
            Value::Array(
                kernel
                    .language_version
                    .iter()
                    .map(|&v| Value::Uint(v as u64))
                    .collect(),
            ),
        ));
    }
    map.push(entry(
        ".args",
        Value::Array(kernel.args.iter().map(arg_to_value).collect()),
    ));
    map.push(entry(
        ".group_segment_fixed_size",
        Value::Uint(kernel.group_segment_size),
    ));
    map.push(entry(
        ".private_segment_fixed_size",
        Value::Uint(kernel.private_segment_size),
    ));
    map.push(entry(
        ".kernarg_segment_size",
        Value::Uint(kernel.kernarg_segment_size),
    ));
    map.push(entry(
        ".kernarg_segment_align",
        Value::Uint(kernel.kernarg_segment_align),
    ));
    map.push(entry(".wavefront_size", Value::Uint(kernel.wavefront_size)));
    map.push(entry(".sgpr_count", Value::Uint(kernel.sgprs_num)));
    map.push(entry(".vgpr_count", Value::Uint(kernel.vgprs_num)));
    map.push(entry(
        ".sgpr_spill_count",
        Value::Uint(kernel.spilled_sgprs),
    ));
    map.push(entry(
        ".vgpr_spill_count",
        Value::Uint(kernel.spilled_vgprs),
    ));
    map.push(entry(
        ".max_flat_workgroup_size",
        Value::Uint(kernel.max_flat_work_group_size),
    ));
    if kernel.reqd_work_group_size != [0; 3] {
        map.push(entry(
            ".reqd_workgroup_size",
            Value::Array(
                kernel
                    .reqd_work_group_size
                    .iter()
                    .map(|&v| Value::Uint(v as u64))
                    .collect(),
            ),
        ));
    }
    if kernel.work_group_size_hint != [0; 3] {
        map.push(entry(
            ".workgroup_size_hint",
            Value::Array(
                kernel
                    .work_group_size_hint
                    .iter()
                    .map(|&v| Value::Uint(v as u64))
                    .collect(),
            ),
        ));
    }
    if !kernel.vec_type_hint.is_empty() {
        map.push(entry(".vec_type_hint", str_val(&kernel.vec_type_hint)));
    }
    Value::Map(map)
}

/// Serialize a metadata tree into its minimal MsgPack form
pub fn write_metadata(metadata: &RocmMetadata) -> Vec<u8> {
    let mut top = vec![entry(
        "amdhsa.version",
        Value::Array(
            metadata
                .version
                .iter()
                .map(|&v| Value::Uint(v as u64))
                .collect(),
        ),
    )];
    if !metadata.printf_infos.is_empty() {
        top.push(entry(
            "amdhsa.printf",
            Value::Array(metadata.printf_infos.iter().map(|s| str_val(s)).collect()),
        ));
    }
    top.push(entry(
        "amdhsa.kernels",
        Value::Array(metadata.kernels.iter().map(kernel_to_value).collect()),
    ));
    let mut out = Vec::new();
    msgpack::write_value(&Value::Map(top), &mut out);
    out
}

fn get_u64(map: &Value, key: &str) -> u64 {
    map.get(key).and_then(Value::as_u64).unwrap_or(0)
}

fn get_str(map: &Value, key: &str) -> String {
    map.get(key)
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string()
}

fn get_bool(map: &Value, key: &str) -> bool {
    matches!(map.get(key), Some(Value::Bool(true)))
}

fn get_triple(map: &Value, key: &str) -> [u32; 3] {
    let mut out = [0u32; 3];
    if let Some(items) = map.get(key).and_then(Value::as_array) {
        for (slot, item) in out.iter_mut().zip(items) {
            *slot = item.as_u64().unwrap_or(0) as u32;
        }
    }
    out
}

fn parse_arg(value: &Value) -> Result<KernelArg, BinaryError> {
    let kind = value_kind_of_name(&get_str(value, ".value_kind"))?;
    let vtype = value_type_of_name(&get_str(value, ".value_type"))?;
    let semantic = match kind {
        ValueKind::GlobalBuffer | ValueKind::DynSharedPointer => super::ArgSemantic::Pointer,
        ValueKind::Image => super::ArgSemantic::Image,
        ValueKind::Sampler => super::ArgSemantic::Sampler,
        ValueKind::Pipe => super::ArgSemantic::Pipe,
        ValueKind::Queue => super::ArgSemantic::Queue,
        _ => super::ArgSemantic::Value,
    };
    Ok(KernelArg {
        name: get_str(value, ".name"),
        type_name: get_str(value, ".type_name"),
        semantic,
        access: access_of_name(&get_str(value, ".access")),
        actual_access: access_of_name(&get_str(value, ".actual_access")),
        address_space: address_space_of_name(&get_str(value, ".address_space")),
        value_kind: kind,
        value_type: vtype,
        size: get_u64(value, ".size"),
        offset: get_u64(value, ".offset"),
        pointee_align: get_u64(value, ".pointee_align"),
        is_const: get_bool(value, ".is_const"),
        is_restrict: get_bool(value, ".is_restrict"),
        is_volatile: get_bool(value, ".is_volatile"),
        is_pipe: get_bool(value, ".is_pipe"),
    })
}

/// Parse a MsgPack metadata document back into the tree
pub fn parse_metadata(bytes: &[u8]) -> Result<RocmMetadata, BinaryError> {
    let (top, _) = msgpack::parse(bytes)?;
    let mut metadata = RocmMetadata::default();
    if let Some(version) = top.get("amdhsa.version").and_then(Value::as_array) {
        for (slot, item) in metadata.version.iter_mut().zip(version) {
            *slot = item.as_u64().unwrap_or(0) as u32;
        }
    }
    if let Some(printfs) = top.get("amdhsa.printf").and_then(Value::as_array) {
        metadata.printf_infos = printfs
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect();
    }
    let kernels = top
        .get("amdhsa.kernels")
        .and_then(Value::as_array)
        .ok_or(BinaryError::Malformed {
            what: "metadata kernel list",
        })?;
    for kernel in kernels {
        let mut out = RocmKernel {
            name: get_str(kernel, ".name"),
            symbol_name: get_str(kernel, ".symbol"),
            language: get_str(kernel, ".language"),
            group_segment_size: get_u64(kernel, ".group_segment_fixed_size"),
            private_segment_size: get_u64(kernel, ".private_segment_fixed_size"),
            kernarg_segment_size: get_u64(kernel, ".kernarg_segment_size"),
            kernarg_segment_align: get_u64(kernel, ".kernarg_segment_align"),
            wavefront_size: get_u64(kernel, ".wavefront_size"),
            sgprs_num: get_u64(kernel, ".sgpr_count"),
            vgprs_num: get_u64(kernel, ".vgpr_count"),
            spilled_sgprs: get_u64(kernel, ".sgpr_spill_count"),
            spilled_vgprs: get_u64(kernel, ".vgpr_spill_count"),
            max_flat_work_group_size: get_u64(kernel, ".max_flat_workgroup_size"),
            reqd_work_group_size: get_triple(kernel, ".reqd_workgroup_size"),
            work_group_size_hint: get_triple(kernel, ".workgroup_size_hint"),
            vec_type_hint: get_str(kernel, ".vec_type_hint"),
            ..RocmKernel::default()
        };
        if let Some(version) = kernel.get(".language_version").and_then(Value::as_array) {
            for (slot, item) in out.language_version.iter_mut().zip(version) {
                *slot = item.as_u64().unwrap_or(0) as u32;
            }
        }
        if let Some(args) = kernel.get(".args").and_then(Value::as_array) {
            for arg in args {
                out.args.push(parse_arg(arg)?);
            }
        }
        metadata.kernels.push(out);
    }
    Ok(metadata)
}

/// Render the older YAML-like text flavor of the same tree
pub fn write_metadata_text(metadata: &RocmMetadata) -> String {
    use std::fmt::Write;
    let mut out = String::from("---\n");
    let _ = writeln!(
        out,
        "Version: [ {}, {} ]",
        metadata.version[0], metadata.version[1]
    );
    if !metadata.printf_infos.is_empty() {
        out.push_str("Printf:\n");
        for printf in &metadata.printf_infos {
            let _ = writeln!(out, "  - '{printf}'");
        }
    }
    out.push_str("Kernels:\n");
    for kernel in &metadata.kernels {
        let _ = writeln!(out, "  - Name: {}", kernel.name);
        let _ = writeln!(out, "    SymbolName: '{}'", kernel.symbol_name);
        if !kernel.args.is_empty() {
            out.push_str("    Args:\n");
            for arg in &kernel.args {
                if !arg.name.is_empty() {
                    let _ = writeln!(out, "      - Name: {}", arg.name);
                    let _ = writeln!(out, "        Size: {}", arg.size);
                } else {
                    let _ = writeln!(out, "      - Size: {}", arg.size);
                }
                let _ = writeln!(out, "        Align: {}", arg.size.max(1));
                let _ = writeln!(out, "        ValueKind: {}", value_kind_name(arg.value_kind));
                let _ = writeln!(out, "        ValueType: {}", value_type_name(arg.value_type));
            }
        }
        let _ = writeln!(
            out,
            "    CodeProps: {{ KernargSegmentSize: {}, GroupSegmentFixedSize: {}, \
             PrivateSegmentFixedSize: {}, WavefrontSize: {} }}",
            kernel.kernarg_segment_size,
            kernel.group_segment_size,
            kernel.private_segment_size,
            kernel.wavefront_size
        );
    }
    out.push_str("...\n");
    out
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod test {
    use super::*;
    use crate::fmt::ArgSemantic;

    fn seventeen_arg_kernel() -> RocmKernel {
        let mut args = Vec::new();
        for i in 0..14 {
            let mut arg = KernelArg::global_pointer(
                &format!("arg{i}"),
                "float*",
                8,
                (i * 8) as u64,
            );
            arg.access = AccessQual::ReadWrite;
            arg.is_const = i % 2 == 0;
            arg.pointee_align = 4;
            args.push(arg);
        }
        for (i, kind) in [
            ValueKind::HiddenGlobalOffsetX,
            ValueKind::HiddenGlobalOffsetY,
            ValueKind::HiddenGlobalOffsetZ,
        ]
        .into_iter()
        .enumerate()
        {
            let mut arg = KernelArg::value("", "", ValueType::I64, 8, 112 + (i as u64) * 8);
            arg.value_kind = kind;
            args.push(arg);
        }
        RocmKernel {
            name: "test_kernel".to_string(),
            symbol_name: "test_kernel@kd".to_string(),
            language: "OpenCL C".to_string(),
            language_version: [2, 0],
            args,
            group_segment_size: 256,
            private_segment_size: 64,
            kernarg_segment_size: 136,
            kernarg_segment_align: 8,
            wavefront_size: 64,
            sgprs_num: 24,
            vgprs_num: 16,
            spilled_sgprs: 0,
            spilled_vgprs: 0,
            max_flat_work_group_size: 256,
            reqd_work_group_size: [8, 8, 1],
            work_group_size_hint: [0; 3],
            vec_type_hint: String::new(),
        }
    }

    #[test]
    fn test_msgpack_roundtrip_structural_equality() {
        let metadata = RocmMetadata {
            version: [1, 0],
            printf_infos: vec!["1:1:4:index\\72%d".to_string()],
            kernels: vec![seventeen_arg_kernel()],
        };
        let bytes = write_metadata(&metadata);
        let parsed = parse_metadata(&bytes).unwrap();
        assert_eq!(parsed, metadata);
        assert_eq!(parsed.kernels[0].args.len(), 17);
        assert_eq!(parsed.kernels[0].args[0].semantic, ArgSemantic::Pointer);
        // re-encoding the parse is byte-identical: every element already
        // used its minimal encoding
        assert_eq!(write_metadata(&parsed), bytes);
    }

    #[test]
    fn test_kernel_without_arguments() {
        let metadata = RocmMetadata {
            version: [1, 0],
            printf_infos: Vec::new(),
            kernels: vec![RocmKernel {
                name: "empty".to_string(),
                symbol_name: "empty@kd".to_string(),
                ..RocmKernel::default()
            }],
        };
        let parsed = parse_metadata(&write_metadata(&metadata)).unwrap();
        assert_eq!(parsed, metadata);
        assert!(parsed.kernels[0].args.is_empty());
    }

    #[test]
    fn test_kernel_with_sixty_four_arguments() {
        let args: Vec<KernelArg> = (0..64)
            .map(|i| KernelArg::global_pointer(&format!("a{i}"), "int*", 8, i * 8))
            .collect();
        let metadata = RocmMetadata {
            version: [1, 0],
            printf_infos: Vec::new(),
            kernels: vec![RocmKernel {
                name: "wide".to_string(),
                symbol_name: "wide@kd".to_string(),
                kernarg_segment_size: 512,
                args,
                ..RocmKernel::default()
            }],
        };
        let bytes = write_metadata(&metadata);
        let parsed = parse_metadata(&bytes).unwrap();
        assert_eq!(parsed, metadata);
        assert_eq!(parsed.kernels[0].args.len(), 64);
        assert_eq!(write_metadata(&parsed), bytes);
    }

    #[test]
    fn test_text_flavor_mentions_every_kernel() {
        let metadata = RocmMetadata {
            version: [1, 0],
            printf_infos: Vec::new(),
            kernels: vec![seventeen_arg_kernel()],
        };
        let text = write_metadata_text(&metadata);
        assert!(text.starts_with("---\n"));
        assert!(text.contains("Name: test_kernel"));
        assert!(text.contains("KernargSegmentSize: 136"));
        assert!(text.ends_with("...\n"));
    }
}
