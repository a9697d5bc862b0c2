/// Record-level reads from NumPy `.npz` archives
///
/// Only the `.npy` header of the `x` entry is parsed to learn the shape.
/// Stored (uncompressed) entries are read by seeking straight to the
/// requested record; deflated entries are streamed up to it. Fortran-ordered
/// arrays keep their records strided and are decoded in full.
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;
use std::str::FromStr;

use ndarray::{ArrayD, Axis, IxDyn};
use ndarray_npy::{ReadNpyExt, ReadableElement};
use num_traits::{AsPrimitive, ToPrimitive};
use py_literal::Value;
use zip::{CompressionMethod, ZipArchive};

use super::array_store::{check_index, missing_field, FIELD};
use crate::MaestroError;

const MAGIC: &[u8; 6] = b"\x93NUMPY";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ByteOrder {
    Little,
    Big,
}

/// Element types that convert to f32.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ElementType {
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F16,
    F32,
    F64,
}

impl ElementType {
    fn size(self) -> usize {
        match self {
            ElementType::Bool | ElementType::I8 | ElementType::U8 => 1,
            ElementType::I16 | ElementType::U16 | ElementType::F16 => 2,
            ElementType::I32 | ElementType::U32 | ElementType::F32 => 4,
            ElementType::I64 | ElementType::U64 | ElementType::F64 => 8,
        }
    }

    /// Parse a NumPy type descriptor such as `<f4` or `|u1`.
    fn from_descr(descr: &str) -> crate::Result<(Self, ByteOrder)> {
        let unsupported = || {
            MaestroError::UnsupportedFormat(format!(
                "element type '{}' cannot be converted to f32",
                descr
            ))
        };

        let mut chars = descr.chars();
        let order = match chars.next() {
            Some('>') => ByteOrder::Big,
            Some('<') | Some('|') | Some('=') => ByteOrder::Little,
            _ => return Err(unsupported()),
        };
        let kind = chars.next().ok_or_else(unsupported)?;
        let size: usize = chars.as_str().parse().map_err(|_| unsupported())?;

        let element = match (kind, size) {
            ('b', 1) => ElementType::Bool,
            ('i', 1) => ElementType::I8,
            ('i', 2) => ElementType::I16,
            ('i', 4) => ElementType::I32,
            ('i', 8) => ElementType::I64,
            ('u', 1) => ElementType::U8,
            ('u', 2) => ElementType::U16,
            ('u', 4) => ElementType::U32,
            ('u', 8) => ElementType::U64,
            ('f', 2) => ElementType::F16,
            ('f', 4) => ElementType::F32,
            ('f', 8) => ElementType::F64,
            _ => return Err(unsupported()),
        };
        Ok((element, order))
    }

    /// Decode raw element bytes into f32 values.
    fn decode(self, order: ByteOrder, bytes: &[u8]) -> Vec<f32> {
        macro_rules! convert {
            ($ty:ty) => {{
                const N: usize = std::mem::size_of::<$ty>();
                bytes
                    .chunks_exact(N)
                    .map(|chunk| {
                        let mut raw = [0u8; N];
                        raw.copy_from_slice(chunk);
                        let value = match order {
                            ByteOrder::Little => <$ty>::from_le_bytes(raw),
                            ByteOrder::Big => <$ty>::from_be_bytes(raw),
                        };
                        AsPrimitive::<f32>::as_(value)
                    })
                    .collect()
            }};
        }

        match self {
            ElementType::Bool => bytes.iter().map(|&b| if b != 0 { 1.0 } else { 0.0 }).collect(),
            ElementType::I8 => convert!(i8),
            ElementType::I16 => convert!(i16),
            ElementType::I32 => convert!(i32),
            ElementType::I64 => convert!(i64),
            ElementType::U8 => convert!(u8),
            ElementType::U16 => convert!(u16),
            ElementType::U32 => convert!(u32),
            ElementType::U64 => convert!(u64),
            ElementType::F16 => bytes
                .chunks_exact(2)
                .map(|chunk| {
                    let raw = [chunk[0], chunk[1]];
                    let bits = match order {
                        ByteOrder::Little => u16::from_le_bytes(raw),
                        ByteOrder::Big => u16::from_be_bytes(raw),
                    };
                    half::f16::from_bits(bits).to_f32()
                })
                .collect(),
            ElementType::F32 => convert!(f32),
            ElementType::F64 => convert!(f64),
        }
    }
}

/// Parsed `.npy` header.
#[derive(Debug, Clone, PartialEq)]
struct NpyHeader {
    element: ElementType,
    order: ByteOrder,
    fortran_order: bool,
    shape: Vec<usize>,
    /// Offset of the array data from the start of the `.npy` entry
    data_offset: u64,
}

impl NpyHeader {
    fn read<R: Read>(reader: &mut R) -> crate::Result<Self> {
        let mut prefix = [0u8; 8];
        reader.read_exact(&mut prefix)?;
        if &prefix[..6] != MAGIC {
            return Err(bad_header("missing magic string"));
        }

        let (dict_len, len_bytes) = match prefix[6] {
            1 => {
                let mut len = [0u8; 2];
                reader.read_exact(&mut len)?;
                (u16::from_le_bytes(len) as usize, 2)
            }
            2 | 3 => {
                let mut len = [0u8; 4];
                reader.read_exact(&mut len)?;
                (u32::from_le_bytes(len) as usize, 4)
            }
            version => return Err(bad_header(format!("unsupported version {}", version))),
        };

        let mut dict = vec![0u8; dict_len];
        reader.read_exact(&mut dict)?;
        let dict = std::str::from_utf8(&dict).map_err(|e| bad_header(e.to_string()))?;

        let mut header = Self::parse_dict(dict.trim())?;
        header.data_offset = (prefix.len() + len_bytes + dict_len) as u64;
        Ok(header)
    }

    fn parse_dict(dict: &str) -> crate::Result<Self> {
        let entries = match Value::from_str(dict) {
            Ok(Value::Dict(entries)) => entries,
            Ok(_) => return Err(bad_header("header is not a dict")),
            Err(e) => return Err(bad_header(e.to_string())),
        };

        let mut descr = None;
        let mut fortran_order = None;
        let mut shape = None;
        for (key, value) in entries {
            match (key, value) {
                (Value::String(k), Value::String(d)) if k == "descr" => descr = Some(d),
                (Value::String(k), Value::Boolean(f)) if k == "fortran_order" => {
                    fortran_order = Some(f)
                }
                (Value::String(k), Value::Tuple(dims)) if k == "shape" => {
                    let dims = dims
                        .iter()
                        .map(|d| match d {
                            Value::Integer(n) => n.to_usize(),
                            _ => None,
                        })
                        .collect::<Option<Vec<_>>>()
                        .ok_or_else(|| bad_header("shape must hold non-negative integers"))?;
                    shape = Some(dims)
                }
                _ => {}
            }
        }

        let descr = descr.ok_or_else(|| bad_header("missing 'descr'"))?;
        let (element, order) = ElementType::from_descr(&descr)?;
        Ok(Self {
            element,
            order,
            fortran_order: fortran_order.ok_or_else(|| bad_header("missing 'fortran_order'"))?,
            shape: shape.ok_or_else(|| bad_header("missing 'shape'"))?,
            data_offset: 0,
        })
    }

    /// Bytes in one record along the leading axis
    fn record_bytes(&self) -> usize {
        self.shape.iter().skip(1).product::<usize>() * self.element.size()
    }
}

fn bad_header<S: Into<String>>(msg: S) -> MaestroError {
    MaestroError::UnsupportedFormat(format!("invalid .npy header: {}", msg.into()))
}

/// Name of the archive entry holding `x`.
///
/// `np.savez(path, x=...)` writes it as "x.npy"; a bare "x" is accepted too.
fn entry_name<R: Read + Seek>(archive: &ZipArchive<R>, path: &Path) -> crate::Result<String> {
    let npy_name = format!("{}.npy", FIELD);
    let names: Vec<&str> = archive.file_names().collect();
    names
        .iter()
        .find(|n| **n == npy_name)
        .or_else(|| names.iter().find(|n| **n == FIELD))
        .map(|n| n.to_string())
        .ok_or_else(|| missing_field(path))
}

/// Decode a whole Fortran-ordered entry with ndarray-npy.
fn read_full<R: Read>(reader: R, element: ElementType) -> crate::Result<ArrayD<f32>> {
    fn read_as<T, R>(reader: R) -> crate::Result<ArrayD<f32>>
    where
        T: ReadableElement + AsPrimitive<f32>,
        R: Read,
    {
        Ok(ArrayD::<T>::read_npy(reader)?.mapv(|v| v.as_()))
    }

    match element {
        ElementType::Bool => Ok(ArrayD::<bool>::read_npy(reader)?.mapv(|b| b as u8 as f32)),
        ElementType::I8 => read_as::<i8, _>(reader),
        ElementType::I16 => read_as::<i16, _>(reader),
        ElementType::I32 => read_as::<i32, _>(reader),
        ElementType::I64 => read_as::<i64, _>(reader),
        ElementType::U8 => read_as::<u8, _>(reader),
        ElementType::U16 => read_as::<u16, _>(reader),
        ElementType::U32 => read_as::<u32, _>(reader),
        ElementType::U64 => read_as::<u64, _>(reader),
        ElementType::F32 => read_as::<f32, _>(reader),
        ElementType::F64 => read_as::<f64, _>(reader),
        ElementType::F16 => Err(MaestroError::UnsupportedFormat(
            "Fortran-ordered f16 arrays are not supported".to_string(),
        )),
    }
}

pub(super) fn field_shape(path: &Path) -> crate::Result<Vec<usize>> {
    let mut archive = ZipArchive::new(File::open(path)?)?;
    let name = entry_name(&archive, path)?;
    let mut entry = archive.by_name(&name)?;
    let header = NpyHeader::read(&mut entry)?;

    if header.element != ElementType::F32 {
        log::debug!(
            "Field '{}' is stored as {:?}; records are converted to f32",
            FIELD,
            header.element
        );
    }
    Ok(header.shape)
}

pub(super) fn read_record(path: &Path, index: usize) -> crate::Result<ArrayD<f32>> {
    let mut archive = ZipArchive::new(File::open(path)?)?;
    let name = entry_name(&archive, path)?;

    let mut entry = archive.by_name(&name)?;
    let header = NpyHeader::read(&mut entry)?;
    check_index(&header.shape, index)?;

    if header.fortran_order {
        drop(entry);
        let field = read_full(archive.by_name(&name)?, header.element)?;
        return Ok(field.index_axis(Axis(0), index).to_owned());
    }

    let record_bytes = header.record_bytes();
    let skip = (index * record_bytes) as u64;
    let mut buf = vec![0u8; record_bytes];

    if entry.compression() == CompressionMethod::Stored {
        let offset = entry.data_start() + header.data_offset + skip;
        drop(entry);
        let mut file = archive.into_inner();
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(&mut buf)?;
    } else {
        io::copy(&mut entry.by_ref().take(skip), &mut io::sink())?;
        entry.read_exact(&mut buf)?;
    }

    let values = header.element.decode(header.order, &buf);
    ArrayD::from_shape_vec(IxDyn(&header.shape[1..]), values)
        .map_err(|e| MaestroError::UnsupportedFormat(format!("record {}: {}", index, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::test_util::{write_entry, EntryLayout};
    use ndarray::{Array2, Array3, ShapeBuilder};

    #[test]
    fn test_parse_descr() {
        assert_eq!(
            ElementType::from_descr("<f4").unwrap(),
            (ElementType::F32, ByteOrder::Little)
        );
        assert_eq!(
            ElementType::from_descr(">i8").unwrap(),
            (ElementType::I64, ByteOrder::Big)
        );
        assert_eq!(
            ElementType::from_descr("|u1").unwrap(),
            (ElementType::U8, ByteOrder::Little)
        );
        assert_eq!(ElementType::from_descr("<f2").unwrap().0, ElementType::F16);
        assert_eq!(ElementType::from_descr("<u8").unwrap().0, ElementType::U64);

        let err = ElementType::from_descr("<c8").unwrap_err();
        assert!(err.to_string().contains("cannot be converted to f32"));
        assert!(ElementType::from_descr("<U10").is_err());
    }

    #[test]
    fn test_decode_byte_orders() {
        let big: Vec<u8> = [1.5f32, -2.0].iter().flat_map(|v| v.to_be_bytes()).collect();
        assert_eq!(ElementType::F32.decode(ByteOrder::Big, &big), vec![1.5, -2.0]);

        let small: Vec<u8> = [-3i8, 7].iter().flat_map(|v| v.to_le_bytes()).collect();
        assert_eq!(ElementType::I8.decode(ByteOrder::Little, &small), vec![-3.0, 7.0]);

        let wide: Vec<u8> = [4_000_000_000u32].iter().flat_map(|v| v.to_le_bytes()).collect();
        assert_eq!(ElementType::U32.decode(ByteOrder::Little, &wide), vec![4.0e9]);

        let half_bits: Vec<u8> = [half::f16::from_f32(0.25), half::f16::from_f32(-8.0)]
            .iter()
            .flat_map(|v| v.to_bits().to_le_bytes())
            .collect();
        assert_eq!(ElementType::F16.decode(ByteOrder::Little, &half_bits), vec![0.25, -8.0]);

        assert_eq!(ElementType::Bool.decode(ByteOrder::Little, &[0, 1, 2]), vec![0.0, 1.0, 1.0]);
    }

    #[test]
    fn test_header_parse() -> crate::Result<()> {
        let dict = "{'descr': '<f8', 'fortran_order': False, 'shape': (4, 2, 3), }";
        let mut bytes = MAGIC.to_vec();
        bytes.extend_from_slice(&[1, 0]);
        bytes.extend_from_slice(&(dict.len() as u16 + 1).to_le_bytes());
        bytes.extend_from_slice(dict.as_bytes());
        bytes.push(b'\n');

        let header = NpyHeader::read(&mut bytes.as_slice())?;
        assert_eq!(header.element, ElementType::F64);
        assert!(!header.fortran_order);
        assert_eq!(header.shape, vec![4, 2, 3]);
        assert_eq!(header.data_offset, bytes.len() as u64);
        assert_eq!(header.record_bytes(), 2 * 3 * 8);

        assert!(NpyHeader::read(&mut &b"not an npy file"[..]).is_err());
        Ok(())
    }

    #[test]
    fn test_stored_and_deflated_records() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let x = Array3::<f64>::from_shape_fn((50, 4, 3), |(i, r, c)| (i * 100 + r * 10 + c) as f64);

        for layout in [EntryLayout::Stored, EntryLayout::Deflated] {
            let path = dir.path().join(format!("{:?}.npz", layout));
            write_entry(&path, "x.npy", &x, layout)?;

            assert_eq!(field_shape(&path)?, vec![50, 4, 3]);
            for index in [0, 1, 37, 49] {
                let record = read_record(&path, index)?;
                assert_eq!(record.shape(), &[4, 3]);
                assert_eq!(record[[2, 1]], (index * 100 + 21) as f32);
            }
            assert!(matches!(
                read_record(&path, 50),
                Err(MaestroError::IndexOutOfRange { index: 50, len: 50 })
            ));
        }
        Ok(())
    }

    #[test]
    fn test_fortran_ordered_entry() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("fortran.npz");
        let x = Array2::<i32>::from_shape_fn((5, 3).f(), |(i, c)| (i * 10 + c) as i32);
        write_entry(&path, "x.npy", &x, EntryLayout::Stored)?;

        let record = read_record(&path, 3)?;
        assert_eq!(record.iter().copied().collect::<Vec<f32>>(), vec![30.0, 31.0, 32.0]);
        Ok(())
    }

    #[test]
    fn test_entry_name_resolution() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let x = Array2::<f32>::zeros((2, 3));

        let bare = dir.path().join("bare.npz");
        write_entry(&bare, "x", &x, EntryLayout::Stored)?;
        assert_eq!(field_shape(&bare)?, vec![2, 3]);

        let other = dir.path().join("other.npz");
        write_entry(&other, "y.npy", &x, EntryLayout::Stored)?;
        assert!(matches!(field_shape(&other), Err(MaestroError::MissingField { .. })));
        Ok(())
    }
}
