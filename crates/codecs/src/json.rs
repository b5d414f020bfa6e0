//! `application/json` for every data kind.

use bytes::Bytes;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use tree_common::{
    ArrayData, Column, ColumnType, ColumnValues, DType, Payload, Scalar, SparseData, Structure,
    StructureKind, TableData,
};

use crate::codec::Codec;
use crate::error::{CodecError, CodecResult};
use crate::media::JSON;

/// Arrays become nested lists, tables an object of column lists in column
/// order, sparse arrays `{shape, coords, data}` with one coordinate list per
/// dimension. Non-finite floats are written as `null`.
#[derive(Debug, Default)]
pub struct JsonCodec;

fn nest(values: &[Scalar], shape: &[usize]) -> Value {
    match shape.split_first() {
        None => values.first().map(Scalar::to_json).unwrap_or(Value::Null),
        Some((&n, rest)) => {
            let step: usize = rest.iter().product();
            Value::Array(
                (0..n)
                    .map(|i| nest(&values[i * step..(i + 1) * step], rest))
                    .collect(),
            )
        }
    }
}

fn flatten(value: &Value, shape: &[usize], dtype: DType, out: &mut Vec<Scalar>) -> CodecResult<()> {
    match shape.split_first() {
        None => {
            let scalar = dtype
                .scalar_from_json(value)
                .ok_or_else(|| CodecError::decode(JSON, format!("{} is not a {} value", value, dtype)))?;
            out.push(scalar);
        }
        Some((&n, rest)) => {
            let items = value
                .as_array()
                .filter(|items| items.len() == n)
                .ok_or_else(|| CodecError::decode(JSON, format!("expected a list of {} items", n)))?;
            for item in items {
                flatten(item, rest, dtype, out)?;
            }
        }
    }
    Ok(())
}

struct TableJson<'a>(&'a TableData);

impl Serialize for TableJson<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.columns.len()))?;
        for column in &self.0.columns {
            let values: Vec<Value> = (0..column.values.len())
                .map(|row| column.values.value_json(row))
                .collect();
            map.serialize_entry(&column.name, &values)?;
        }
        map.end()
    }
}

#[derive(Serialize, Deserialize)]
struct SparseJson {
    shape: Vec<usize>,
    coords: Vec<Vec<usize>>,
    data: Vec<Value>,
}

fn column_from_json(name: &str, dtype: ColumnType, items: &[Value]) -> CodecResult<ColumnValues> {
    let bad = |v: &Value| CodecError::decode(JSON, format!("column '{}': {} is not {}", name, v, dtype.as_str()));
    let values = match dtype {
        ColumnType::Bool => ColumnValues::Bool(
            items
                .iter()
                .map(|v| v.as_bool().ok_or_else(|| bad(v)))
                .collect::<CodecResult<_>>()?,
        ),
        ColumnType::Int64 => ColumnValues::Int64(
            items
                .iter()
                .map(|v| v.as_i64().ok_or_else(|| bad(v)))
                .collect::<CodecResult<_>>()?,
        ),
        ColumnType::Float64 => ColumnValues::Float64(
            items
                .iter()
                .map(|v| {
                    let f = if v.is_null() { Some(f64::NAN) } else { v.as_f64() };
                    f.ok_or_else(|| bad(v))
                })
                .collect::<CodecResult<_>>()?,
        ),
        ColumnType::Utf8 => ColumnValues::Utf8(
            items
                .iter()
                .map(|v| v.as_str().map(str::to_string).ok_or_else(|| bad(v)))
                .collect::<CodecResult<_>>()?,
        ),
    };
    Ok(values)
}

impl Codec for JsonCodec {
    fn media_type(&self) -> &'static str {
        JSON
    }

    fn kinds(&self) -> &'static [StructureKind] {
        &[StructureKind::Array, StructureKind::Table, StructureKind::Sparse]
    }

    fn encode(&self, payload: &Payload) -> CodecResult<Bytes> {
        let encoded = match payload {
            Payload::Array(a) => serde_json::to_vec(&nest(&a.scalars(), &a.shape)),
            Payload::Table(t) => serde_json::to_vec(&TableJson(t)),
            Payload::Sparse(s) => {
                let ndim = s.shape.len();
                let doc = SparseJson {
                    shape: s.shape.clone(),
                    coords: (0..ndim)
                        .map(|d| s.coords.iter().map(|c| c[d]).collect())
                        .collect(),
                    data: (0..s.nnz()).map(|i| s.value(i).to_json()).collect(),
                };
                serde_json::to_vec(&doc)
            }
        };
        encoded
            .map(Bytes::from)
            .map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode(&self, bytes: &[u8], structure: &Structure) -> CodecResult<Payload> {
        let malformed = |e: serde_json::Error| CodecError::decode(JSON, e.to_string());
        match structure {
            Structure::Array(a) => {
                let value: Value = serde_json::from_slice(bytes).map_err(malformed)?;
                let mut scalars = Vec::with_capacity(a.len());
                flatten(&value, &a.shape, a.dtype, &mut scalars)?;
                ArrayData::from_scalars(a.dtype, a.shape.clone(), &scalars)
                    .map(Payload::Array)
                    .map_err(|e| CodecError::decode(JSON, e.to_string()))
            }
            Structure::Table(t) => {
                let object: serde_json::Map<String, Value> =
                    serde_json::from_slice(bytes).map_err(malformed)?;
                let mut columns = Vec::with_capacity(t.columns.len());
                for descriptor in &t.columns {
                    let items = object
                        .get(&descriptor.name)
                        .and_then(Value::as_array)
                        .ok_or_else(|| {
                            CodecError::decode(JSON, format!("missing column '{}'", descriptor.name))
                        })?;
                    let values = column_from_json(&descriptor.name, descriptor.dtype, items)?;
                    columns.push(Column::new(descriptor.name.clone(), values));
                }
                TableData::new(columns)
                    .map(Payload::Table)
                    .map_err(|e| CodecError::decode(JSON, e.to_string()))
            }
            Structure::Sparse(s) => {
                let doc: SparseJson = serde_json::from_slice(bytes).map_err(malformed)?;
                if doc.coords.len() != doc.shape.len() {
                    return Err(CodecError::decode(JSON, "one coordinate list per dimension expected"));
                }
                let nnz = doc.data.len();
                if doc.coords.iter().any(|c| c.len() != nnz) {
                    return Err(CodecError::decode(JSON, "coordinate lists differ in length from data"));
                }
                let coords = (0..nnz)
                    .map(|i| doc.coords.iter().map(|dim| dim[i]).collect())
                    .collect();
                let mut values = Vec::with_capacity(nnz * s.dtype.itemsize());
                for v in &doc.data {
                    let scalar = s
                        .dtype
                        .scalar_from_json(v)
                        .ok_or_else(|| CodecError::decode(JSON, format!("{} is not a {} value", v, s.dtype)))?;
                    s.dtype
                        .encode(scalar, &mut values)
                        .map_err(|e| CodecError::decode(JSON, e.to_string()))?;
                }
                SparseData::new(doc.shape, s.dtype, coords, values)
                    .map(Payload::Sparse)
                    .map_err(|e| CodecError::decode(JSON, e.to_string()))
            }
            Structure::Container { .. } => {
                Err(CodecError::decode(JSON, "containers carry no data"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_array_nests_by_shape() {
        let array = ArrayData::from_f64(vec![2, 3], &[0.0, 1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        let encoded = JsonCodec.encode(&Payload::Array(array)).unwrap();
        assert_eq!(&encoded[..], b"[[0.0,1.0,2.0],[3.0,4.0,5.0]]");
    }

    #[test]
    fn test_zero_dimensional_array() {
        let array = ArrayData::from_f64(vec![], &[7.5]).unwrap();
        let encoded = JsonCodec.encode(&Payload::Array(array)).unwrap();
        assert_eq!(&encoded[..], b"7.5");
    }

    #[test]
    fn test_table_keeps_column_order() {
        let table = TableData::new(vec![
            Column::new("zeta", ColumnValues::Int64(vec![1])),
            Column::new("alpha", ColumnValues::Utf8(vec!["a".into()])),
        ])
        .unwrap();
        let encoded = JsonCodec.encode(&Payload::Table(table)).unwrap();
        assert_eq!(&encoded[..], br#"{"zeta":[1],"alpha":["a"]}"#);
    }

    #[test]
    fn test_non_finite_is_null() {
        let array = ArrayData::from_f64(vec![2], &[f64::NAN, 1.0]).unwrap();
        let encoded = JsonCodec.encode(&Payload::Array(array)).unwrap();
        assert_eq!(&encoded[..], b"[null,1.0]");
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let structure = Structure::Array(tree_common::ArrayStructure::unchunked(vec![2, 2], DType::f64()));
        assert!(JsonCodec.decode(b"[[1.0,2.0],[3.0]]", &structure).is_err());
        assert!(JsonCodec.decode(b"not json", &structure).is_err());
    }
}
