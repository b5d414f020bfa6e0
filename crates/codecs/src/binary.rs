//! Binary codecs: raw array bytes, COO sparse buffers and columnar tables.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use tree_common::{
    ArrayData, Column, ColumnType, ColumnValues, Payload, SparseData, Structure, StructureKind,
    TableData,
};

use crate::codec::Codec;
use crate::error::{CodecError, CodecResult};
use crate::media::{COLUMNAR, OCTET_STREAM};

/// `application/octet-stream`.
///
/// Arrays are written as their raw C-order buffer in the declared byte
/// order. Sparse arrays are written as `ndim` blocks of `nnz` little-endian
/// u64 coordinates, one block per dimension, followed by the packed values.
#[derive(Debug, Default)]
pub struct OctetStreamCodec;

impl Codec for OctetStreamCodec {
    fn media_type(&self) -> &'static str {
        OCTET_STREAM
    }

    fn kinds(&self) -> &'static [StructureKind] {
        &[StructureKind::Array, StructureKind::Sparse]
    }

    fn encode(&self, payload: &Payload) -> CodecResult<Bytes> {
        match payload {
            Payload::Array(a) => Ok(a.bytes.clone()),
            Payload::Sparse(s) => {
                let ndim = s.shape.len();
                let mut out = BytesMut::with_capacity(s.nnz() * ndim * 8 + s.values.len());
                for d in 0..ndim {
                    for coord in &s.coords {
                        out.put_u64_le(coord[d] as u64);
                    }
                }
                out.put_slice(&s.values);
                Ok(out.freeze())
            }
            Payload::Table(_) => Err(CodecError::unencodable(OCTET_STREAM, "tables have no raw form")),
        }
    }

    fn decode(&self, bytes: &[u8], structure: &Structure) -> CodecResult<Payload> {
        match structure {
            Structure::Array(a) => ArrayData::new(a.dtype, a.shape.clone(), bytes.to_vec())
                .map(Payload::Array)
                .map_err(|e| CodecError::decode(OCTET_STREAM, e.to_string())),
            Structure::Sparse(s) => {
                let ndim = s.shape.len();
                let entry = ndim * 8 + s.dtype.itemsize();
                if bytes.len() % entry != 0 {
                    return Err(CodecError::decode(
                        OCTET_STREAM,
                        format!("{} bytes is not a whole number of {}-byte entries", bytes.len(), entry),
                    ));
                }
                let nnz = bytes.len() / entry;
                let mut buf = bytes;
                let mut coords = vec![vec![0usize; ndim]; nnz];
                for d in 0..ndim {
                    for coord in coords.iter_mut() {
                        coord[d] = buf.get_u64_le() as usize;
                    }
                }
                SparseData::new(s.shape.clone(), s.dtype, coords, buf.to_vec())
                    .map(Payload::Sparse)
                    .map_err(|e| CodecError::decode(OCTET_STREAM, e.to_string()))
            }
            other => Err(CodecError::decode(
                OCTET_STREAM,
                format!("cannot decode {} data", other.kind()),
            )),
        }
    }
}

const COLUMNAR_MAGIC: &[u8; 4] = b"TCOL";

fn type_code(dtype: ColumnType) -> u8 {
    match dtype {
        ColumnType::Bool => 0,
        ColumnType::Int64 => 1,
        ColumnType::Float64 => 2,
        ColumnType::Utf8 => 3,
    }
}

fn type_from_code(code: u8) -> Option<ColumnType> {
    match code {
        0 => Some(ColumnType::Bool),
        1 => Some(ColumnType::Int64),
        2 => Some(ColumnType::Float64),
        3 => Some(ColumnType::Utf8),
        _ => None,
    }
}

fn column_buffer(values: &ColumnValues) -> BytesMut {
    let mut buf = BytesMut::new();
    match values {
        ColumnValues::Bool(v) => v.iter().for_each(|&b| buf.put_u8(b as u8)),
        ColumnValues::Int64(v) => v.iter().for_each(|&i| buf.put_i64_le(i)),
        ColumnValues::Float64(v) => v.iter().for_each(|&f| buf.put_f64_le(f)),
        ColumnValues::Utf8(v) => {
            let mut offset = 0u64;
            buf.put_u64_le(0);
            for s in v {
                offset += s.len() as u64;
                buf.put_u64_le(offset);
            }
            v.iter().for_each(|s| buf.put_slice(s.as_bytes()));
        }
    }
    buf
}

/// `application/vnd.tree.columnar`: a self-describing columnar table.
///
/// ```text
/// "TCOL" | u32 columns | u64 rows
/// per column: u16 name_len | name | u8 type | u64 buf_len | buf
/// ```
///
/// All integers are little-endian. Utf8 buffers hold `rows + 1` u64 offsets
/// followed by the concatenated string bytes.
#[derive(Debug, Default)]
pub struct ColumnarCodec;

struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    fn need(&self, n: usize) -> CodecResult<()> {
        if self.buf.remaining() < n {
            Err(CodecError::decode(COLUMNAR, "unexpected end of input"))
        } else {
            Ok(())
        }
    }

    fn u8(&mut self) -> CodecResult<u8> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    fn u16(&mut self) -> CodecResult<u16> {
        self.need(2)?;
        Ok(self.buf.get_u16_le())
    }

    fn u32(&mut self) -> CodecResult<u32> {
        self.need(4)?;
        Ok(self.buf.get_u32_le())
    }

    fn u64(&mut self) -> CodecResult<u64> {
        self.need(8)?;
        Ok(self.buf.get_u64_le())
    }

    fn take(&mut self, n: usize) -> CodecResult<&'a [u8]> {
        self.need(n)?;
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }
}

fn decode_column(dtype: ColumnType, rows: usize, mut buf: &[u8]) -> CodecResult<ColumnValues> {
    let width = match dtype {
        ColumnType::Bool => 1,
        ColumnType::Int64 | ColumnType::Float64 => 8,
        ColumnType::Utf8 => 0,
    };
    if width > 0 && buf.len() != rows * width {
        return Err(CodecError::decode(
            COLUMNAR,
            format!("{} column buffer of {} bytes for {} rows", dtype.as_str(), buf.len(), rows),
        ));
    }

    let values = match dtype {
        ColumnType::Bool => ColumnValues::Bool(buf.iter().map(|&b| b != 0).collect()),
        ColumnType::Int64 => ColumnValues::Int64((0..rows).map(|_| buf.get_i64_le()).collect()),
        ColumnType::Float64 => ColumnValues::Float64((0..rows).map(|_| buf.get_f64_le()).collect()),
        ColumnType::Utf8 => {
            let header = (rows + 1) * 8;
            if buf.len() < header {
                return Err(CodecError::decode(COLUMNAR, "truncated string offsets"));
            }
            let (mut offsets, data) = buf.split_at(header);
            let offsets: Vec<usize> = (0..=rows).map(|_| offsets.get_u64_le() as usize).collect();
            let mut strings = Vec::with_capacity(rows);
            for w in offsets.windows(2) {
                let bytes = data
                    .get(w[0]..w[1])
                    .ok_or_else(|| CodecError::decode(COLUMNAR, "string offset out of range"))?;
                let s = std::str::from_utf8(bytes)
                    .map_err(|e| CodecError::decode(COLUMNAR, e.to_string()))?;
                strings.push(s.to_string());
            }
            ColumnValues::Utf8(strings)
        }
    };
    Ok(values)
}

impl Codec for ColumnarCodec {
    fn media_type(&self) -> &'static str {
        COLUMNAR
    }

    fn kinds(&self) -> &'static [StructureKind] {
        &[StructureKind::Table]
    }

    fn encode(&self, payload: &Payload) -> CodecResult<Bytes> {
        let Payload::Table(table) = payload else {
            return Err(CodecError::unencodable(COLUMNAR, "only tables are columnar"));
        };

        let mut out = BytesMut::new();
        out.put_slice(COLUMNAR_MAGIC);
        out.put_u32_le(table.columns.len() as u32);
        out.put_u64_le(table.row_count() as u64);
        for column in &table.columns {
            let name = column.name.as_bytes();
            let name_len = u16::try_from(name.len())
                .map_err(|_| CodecError::Encode(format!("column name '{}' is too long", column.name)))?;
            out.put_u16_le(name_len);
            out.put_slice(name);
            out.put_u8(type_code(column.values.dtype()));
            let buf = column_buffer(&column.values);
            out.put_u64_le(buf.len() as u64);
            out.put_slice(&buf);
        }
        Ok(out.freeze())
    }

    fn decode(&self, bytes: &[u8], structure: &Structure) -> CodecResult<Payload> {
        let mut reader = Reader { buf: bytes };
        if reader.take(4)? != COLUMNAR_MAGIC {
            return Err(CodecError::decode(COLUMNAR, "bad magic"));
        }
        let ncols = reader.u32()? as usize;
        let rows = reader.u64()? as usize;

        let mut columns = Vec::with_capacity(ncols);
        for _ in 0..ncols {
            let name_len = reader.u16()? as usize;
            let name = std::str::from_utf8(reader.take(name_len)?)
                .map_err(|e| CodecError::decode(COLUMNAR, e.to_string()))?
                .to_string();
            let code = reader.u8()?;
            let dtype = type_from_code(code)
                .ok_or_else(|| CodecError::decode(COLUMNAR, format!("unknown column type {}", code)))?;
            let len = reader.u64()? as usize;
            let values = decode_column(dtype, rows, reader.take(len)?)?;
            columns.push(Column::new(name, values));
        }
        if reader.buf.has_remaining() {
            return Err(CodecError::decode(COLUMNAR, "trailing bytes after last column"));
        }

        if let Structure::Table(expected) = structure {
            let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
            let wanted: Vec<&str> = expected.columns.iter().map(|c| c.name.as_str()).collect();
            if names != wanted {
                return Err(CodecError::decode(
                    COLUMNAR,
                    format!("columns {:?} do not match {:?}", names, wanted),
                ));
            }
        }

        TableData::new(columns)
            .map(Payload::Table)
            .map_err(|e| CodecError::decode(COLUMNAR, e.to_string()))
    }
}
