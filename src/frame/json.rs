use serde_json::{Map, Value as JsonValue};

use super::{Column, Frame};
use crate::error::DatasetError;
use crate::types::{DType, RowValues};

impl Frame {
    /// Serialize as an array of `{column: value}` records.
    #[must_use]
    pub fn to_json_records(&self) -> JsonValue {
        let records = self
            .rows
            .iter()
            .map(|row| {
                let record: Map<String, JsonValue> = self
                    .columns
                    .iter()
                    .zip(row)
                    .map(|(column, value)| (column.name.clone(), value.to_json()))
                    .collect();
                JsonValue::Object(record)
            })
            .collect();
        JsonValue::Array(records)
    }

    /// Serialize as a JSON records string.
    ///
    /// # Errors
    /// Returns `DatasetError::JsonError` if serialization fails.
    pub fn to_json_string(&self) -> Result<String, DatasetError> {
        Ok(serde_json::to_string(&self.to_json_records())?)
    }

    /// Parse an array of JSON records into a frame.
    ///
    /// Columns appear in first-seen order; keys missing from a record become NULL. Column types
    /// are inferred from the values.
    ///
    /// # Errors
    /// Returns `DatasetError::JsonError` for malformed JSON and
    /// `DatasetError::ConversionError` if the document is not an array of objects.
    pub fn from_json_records(input: &str) -> Result<Frame, DatasetError> {
        let document: JsonValue = serde_json::from_str(input)?;
        let JsonValue::Array(records) = document else {
            return Err(DatasetError::ConversionError(
                "expected a JSON array of records".to_string(),
            ));
        };

        let mut objects = Vec::with_capacity(records.len());
        let mut names: Vec<String> = Vec::new();
        for record in records {
            let JsonValue::Object(object) = record else {
                return Err(DatasetError::ConversionError(
                    "every JSON record must be an object".to_string(),
                ));
            };
            for key in object.keys() {
                if !names.contains(key) {
                    names.push(key.clone());
                }
            }
            objects.push(object);
        }

        let mut frame = Frame::new(
            names
                .iter()
                .map(|name| Column::new(name.clone(), DType::Null))
                .collect(),
        );
        for mut object in objects {
            let row = names
                .iter()
                .map(|name| {
                    object
                        .remove(name)
                        .map_or(RowValues::Null, RowValues::from_json)
                })
                .collect();
            frame.push_row(row)?;
        }
        frame.infer_dtypes();
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_fill_missing_keys_with_null() {
        let frame =
            Frame::from_json_records(r#"[{"id": 1, "name": "a"}, {"id": 2, "extra": true}]"#)
                .unwrap();
        assert_eq!(frame.num_rows(), 2);
        assert_eq!(frame.num_columns(), 3);
        assert_eq!(frame.get(1, "name"), Some(&RowValues::Null));
        assert_eq!(frame.columns()[2].dtype, DType::Bool);
    }

    #[test]
    fn records_keep_column_order() {
        let frame = Frame::from_json_records(r#"[{"zeta": 1, "alpha": "x"}]"#).unwrap();
        assert_eq!(frame.column_names(), vec!["zeta", "alpha"]);
        assert_eq!(frame.to_json_string().unwrap(), r#"[{"zeta":1,"alpha":"x"}]"#);
        assert_eq!(
            frame.schema().keys().collect::<Vec<_>>(),
            vec!["zeta", "alpha"]
        );
    }

    #[test]
    fn non_array_documents_are_rejected() {
        assert!(matches!(
            Frame::from_json_records(r#"{"id": 1}"#),
            Err(DatasetError::ConversionError(_))
        ));
        assert!(matches!(
            Frame::from_json_records("[1, 2]"),
            Err(DatasetError::ConversionError(_))
        ));
    }

    #[test]
    fn records_serialize_per_row() {
        let frame = Frame::from_rows(
            ["id", "name"],
            vec![vec![RowValues::Int(7), RowValues::Text("x".into())]],
        )
        .unwrap();
        assert_eq!(
            frame.to_json_records(),
            serde_json::json!([{"id": 7, "name": "x"}])
        );
    }
}
