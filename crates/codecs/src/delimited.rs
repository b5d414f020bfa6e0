//! `text/csv` for tables and arrays of up to two dimensions.

use bytes::Bytes;
use csv::{ReaderBuilder, WriterBuilder};

use tree_common::{
    ArrayData, Column, ColumnType, ColumnValues, Payload, Scalar, Structure, StructureKind,
    TableData,
};

use crate::codec::Codec;
use crate::error::{CodecError, CodecResult};
use crate::media::CSV;

/// Tables get a header row of column names. Arrays have no header: a 1-D
/// array is one value per line, a 2-D array one row per line, and an empty
/// array is an empty document.
#[derive(Debug, Default)]
pub struct CsvCodec;

fn encode_err(e: impl std::fmt::Display) -> CodecError {
    CodecError::Encode(e.to_string())
}

fn decode_err(e: impl std::fmt::Display) -> CodecError {
    CodecError::decode(CSV, e.to_string())
}

fn parse_cell(dtype: ColumnType, text: &str, values: &mut ColumnValues) -> CodecResult<()> {
    let bad = || decode_err(format!("'{}' is not {}", text, dtype.as_str()));
    match values {
        ColumnValues::Bool(v) => v.push(match text {
            "true" => true,
            "false" => false,
            _ => return Err(bad()),
        }),
        ColumnValues::Int64(v) => v.push(text.parse().map_err(|_| bad())?),
        ColumnValues::Float64(v) => v.push(text.parse().map_err(|_| bad())?),
        ColumnValues::Utf8(v) => v.push(text.to_string()),
    }
    Ok(())
}

impl Codec for CsvCodec {
    fn media_type(&self) -> &'static str {
        CSV
    }

    fn kinds(&self) -> &'static [StructureKind] {
        &[StructureKind::Array, StructureKind::Table]
    }

    fn can_encode(&self, kind: StructureKind, shape: &[usize]) -> bool {
        match kind {
            StructureKind::Array => shape.len() <= 2,
            _ => self.supports(kind),
        }
    }

    fn encode(&self, payload: &Payload) -> CodecResult<Bytes> {
        let mut writer = WriterBuilder::new().has_headers(false).from_writer(Vec::new());
        match payload {
            Payload::Table(table) => {
                writer.write_record(table.column_names()).map_err(encode_err)?;
                for row in 0..table.row_count() {
                    writer
                        .write_record(table.columns.iter().map(|c| c.values.value_text(row)))
                        .map_err(encode_err)?;
                }
            }
            Payload::Array(array) => {
                if array.shape.len() > 2 {
                    return Err(CodecError::unencodable(
                        CSV,
                        format!("{}-dimensional arrays have no tabular form", array.shape.len()),
                    ));
                }
                if !array.is_empty() {
                    let width = array.shape.get(1).copied().unwrap_or(1);
                    let scalars = array.scalars();
                    for row in scalars.chunks(width) {
                        writer
                            .write_record(row.iter().map(Scalar::to_string))
                            .map_err(encode_err)?;
                    }
                }
            }
            Payload::Sparse(_) => {
                return Err(CodecError::unencodable(CSV, "sparse arrays have no tabular form"))
            }
        }
        writer.into_inner().map(Bytes::from).map_err(encode_err)
    }

    fn decode(&self, bytes: &[u8], structure: &Structure) -> CodecResult<Payload> {
        match structure {
            Structure::Table(t) => {
                let mut reader = ReaderBuilder::new().has_headers(true).from_reader(bytes);
                let headers = reader.headers().map_err(decode_err)?.clone();
                let names: Vec<&str> = headers.iter().collect();
                let wanted: Vec<&str> = t.columns.iter().map(|c| c.name.as_str()).collect();
                if names != wanted {
                    return Err(decode_err(format!("header {:?} does not match {:?}", names, wanted)));
                }

                let mut values: Vec<ColumnValues> =
                    t.columns.iter().map(|c| ColumnValues::empty(c.dtype)).collect();
                for record in reader.records() {
                    let record = record.map_err(decode_err)?;
                    for ((field, descriptor), column) in
                        record.iter().zip(&t.columns).zip(values.iter_mut())
                    {
                        parse_cell(descriptor.dtype, field, column)?;
                    }
                }

                let columns = t
                    .columns
                    .iter()
                    .zip(values)
                    .map(|(d, v)| Column::new(d.name.clone(), v))
                    .collect();
                TableData::new(columns).map(Payload::Table).map_err(decode_err)
            }
            Structure::Array(a) => {
                if a.shape.len() > 2 {
                    return Err(decode_err("arrays above two dimensions are not tabular"));
                }
                let mut scalars = Vec::with_capacity(a.len());
                if !a.is_empty() {
                    let width = a.shape.get(1).copied().unwrap_or(1);
                    let mut reader = ReaderBuilder::new().has_headers(false).from_reader(bytes);
                    for record in reader.records() {
                        let record = record.map_err(decode_err)?;
                        if record.len() != width {
                            return Err(decode_err(format!(
                                "row of {} values, expected {}",
                                record.len(),
                                width
                            )));
                        }
                        for field in record.iter() {
                            let scalar = a.dtype.scalar_from_str(field).ok_or_else(|| {
                                decode_err(format!("'{}' is not a {} value", field, a.dtype))
                            })?;
                            scalars.push(scalar);
                        }
                    }
                }
                ArrayData::from_scalars(a.dtype, a.shape.clone(), &scalars)
                    .map(Payload::Array)
                    .map_err(decode_err)
            }
            other => Err(decode_err(format!("cannot decode {} data", other.kind()))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tree_common::DType;

    #[test]
    fn test_table_with_header() {
        let table = TableData::new(vec![
            Column::new("id", ColumnValues::Int64(vec![1, 2])),
            Column::new("label", ColumnValues::Utf8(vec!["a,b".into(), "c".into()])),
        ])
        .unwrap();
        let encoded = CsvCodec.encode(&Payload::Table(table)).unwrap();
        assert_eq!(&encoded[..], b"id,label\n1,\"a,b\"\n2,c\n");
    }

    #[test]
    fn test_matrix_rows() {
        let array = ArrayData::from_scalars(
            DType::i32(),
            vec![2, 2],
            &[Scalar::Int(1), Scalar::Int(2), Scalar::Int(3), Scalar::Int(4)],
        )
        .unwrap();
        let encoded = CsvCodec.encode(&Payload::Array(array)).unwrap();
        assert_eq!(&encoded[..], b"1,2\n3,4\n");
    }

    #[test]
    fn test_cube_is_unencodable() {
        let array = ArrayData::from_f64(vec![1, 1, 1], &[0.0]).unwrap();
        assert!(matches!(
            CsvCodec.encode(&Payload::Array(array)),
            Err(CodecError::Unencodable { .. })
        ));
    }

    #[test]
    fn test_header_mismatch() {
        let structure = Structure::Table(tree_common::TableStructure {
            columns: vec![tree_common::ColumnDescriptor::new("x", ColumnType::Int64)],
            row_count: 1,
            partitions: Vec::new(),
        });
        assert!(CsvCodec.decode(b"y\n1\n", &structure).is_err());
        assert!(CsvCodec.decode(b"x\none\n", &structure).is_err());
    }
}
