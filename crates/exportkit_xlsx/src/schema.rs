//! Record type declarations flattened into ordered column schemas.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::conf::N_NCOLS_EXCEL_MAX;
use crate::spec::{
    EnumFieldKind, EnumUntaggedFieldRule, SchemaError, SpecFieldDescriptor, SpecRecordSchema,
    SpecRecordType, TabularRecord,
};
use crate::util::validate_display_name;

/// Flatten a record type declaration into an ordered column schema.
///
/// Fields are visited in declaration order. A scalar field yields one
/// descriptor with a single-step path; an embedded record is expanded in place
/// (depth-first), each child path prefixed by the embedding field.
///
/// Untagged scalars follow `rule_untagged`. Fails with [`SchemaError`] when
/// `record_type` is `None`, an annotation is malformed, an embedding is
/// recursive, or nothing is left to export.
pub fn extract_schema(
    record_type: Option<&SpecRecordType>,
    rule_untagged: EnumUntaggedFieldRule,
) -> Result<SpecRecordSchema, SchemaError> {
    let Some(record_type) = record_type else {
        return Err(SchemaError::MissingRecordType);
    };

    let mut l_fields = Vec::new();
    let mut l_path_prefix = Vec::new();
    let mut l_types_visiting = vec![record_type.name];
    extend_fields(
        record_type,
        rule_untagged,
        &mut l_path_prefix,
        &mut l_types_visiting,
        &mut l_fields,
    )?;

    if l_fields.is_empty() {
        return Err(SchemaError::EmptySchema {
            record: record_type.name,
        });
    }
    if l_fields.len() > N_NCOLS_EXCEL_MAX {
        return Err(SchemaError::TooManyColumns {
            record: record_type.name,
            width: l_fields.len(),
            limit: N_NCOLS_EXCEL_MAX,
        });
    }

    Ok(SpecRecordSchema {
        record_name: record_type.name,
        fields: l_fields,
    })
}

fn extend_fields(
    record_type: &SpecRecordType,
    rule_untagged: EnumUntaggedFieldRule,
    path_prefix: &mut Vec<&'static str>,
    types_visiting: &mut Vec<&'static str>,
    l_fields: &mut Vec<SpecFieldDescriptor>,
) -> Result<(), SchemaError> {
    for (n_idx, field) in record_type.fields.iter().enumerate() {
        if field.ident.is_empty() {
            return Err(SchemaError::EmptyIdentifier {
                record: record_type.name,
                position: n_idx,
            });
        }
        if let Some(c_name) = field.display_name {
            validate_display_name(c_name).map_err(|reason| SchemaError::MalformedAnnotation {
                record: record_type.name,
                field: field.ident,
                reason,
            })?;
        }

        match field.kind {
            EnumFieldKind::Scalar(kind) => {
                let display_name = match (field.display_name, rule_untagged) {
                    (Some(c_name), _) => c_name.to_string(),
                    (None, EnumUntaggedFieldRule::Identifier) => field.ident.to_string(),
                    (None, EnumUntaggedFieldRule::Skip) => continue,
                };
                let mut path = path_prefix.clone();
                path.push(field.ident);
                l_fields.push(SpecFieldDescriptor {
                    display_name,
                    path,
                    kind,
                });
            }
            EnumFieldKind::Record(derive_record_type) => {
                let record_type_child = derive_record_type();
                path_prefix.push(field.ident);
                if types_visiting.contains(&record_type_child.name) {
                    return Err(SchemaError::RecursiveEmbedding {
                        record: record_type_child.name,
                        path: path_prefix.join("."),
                    });
                }

                types_visiting.push(record_type_child.name);
                extend_fields(
                    record_type_child,
                    rule_untagged,
                    path_prefix,
                    types_visiting,
                    l_fields,
                )?;
                types_visiting.pop();
                path_prefix.pop();
            }
        }
    }
    Ok(())
}

/// Per-type memo of extracted schemas, shared read-mostly across requests.
#[derive(Debug, Default)]
pub struct SchemaCache {
    rule_untagged: EnumUntaggedFieldRule,
    dict_schemas: RwLock<BTreeMap<&'static str, Arc<SpecRecordSchema>>>,
}

impl SchemaCache {
    /// Create an empty cache applying `rule_untagged` to every type.
    pub fn new(rule_untagged: EnumUntaggedFieldRule) -> Self {
        Self {
            rule_untagged,
            dict_schemas: RwLock::new(BTreeMap::new()),
        }
    }

    /// Untagged-field rule used for extraction.
    pub fn rule_untagged(&self) -> EnumUntaggedFieldRule {
        self.rule_untagged
    }

    /// Schema of `T`, extracted on first use.
    pub fn get_or_extract<T: TabularRecord>(&self) -> Result<Arc<SpecRecordSchema>, SchemaError> {
        self.get_or_extract_type(T::record_type())
    }

    /// Schema of `record_type`, extracted on first use.
    pub fn get_or_extract_type(
        &self,
        record_type: &'static SpecRecordType,
    ) -> Result<Arc<SpecRecordSchema>, SchemaError> {
        if let Some(schema) = self.dict_schemas.read().get(record_type.name) {
            return Ok(Arc::clone(schema));
        }

        let schema = Arc::new(extract_schema(Some(record_type), self.rule_untagged)?);
        let mut dict_schemas = self.dict_schemas.write();
        Ok(Arc::clone(
            dict_schemas.entry(record_type.name).or_insert(schema),
        ))
    }

    /// Number of cached schemas.
    pub fn len(&self) -> usize {
        self.dict_schemas.read().len()
    }

    /// Whether nothing has been cached yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{EnumCellKind, SpecFieldDecl};

    static SALARY: SpecRecordType = SpecRecordType {
        name: "Salary",
        fields: &[
            SpecFieldDecl::scalar("employee_id", "Employee ID", EnumCellKind::Integer),
            SpecFieldDecl::scalar("amount", "Amount", EnumCellKind::Float),
            SpecFieldDecl::scalar("from_date", "From Date", EnumCellKind::DateTime),
        ],
    };

    static TITLE: SpecRecordType = SpecRecordType {
        name: "Title",
        fields: &[
            SpecFieldDecl::scalar("employee_id", "Employee ID", EnumCellKind::Integer),
            SpecFieldDecl::scalar("title", "Title", EnumCellKind::Text),
        ],
    };

    static COMPOSITE: SpecRecordType = SpecRecordType {
        name: "Composite",
        fields: &[
            SpecFieldDecl::scalar("id", "ID", EnumCellKind::Integer),
            SpecFieldDecl::embedded("salary", salary_type),
            SpecFieldDecl::scalar("note", "Note", EnumCellKind::Text),
            SpecFieldDecl::embedded("title", title_type),
        ],
    };

    static UNTAGGED: SpecRecordType = SpecRecordType {
        name: "Untagged",
        fields: &[
            SpecFieldDecl::scalar("id", "ID", EnumCellKind::Integer),
            SpecFieldDecl::untagged("raw_code", EnumCellKind::Text),
        ],
    };

    static ONLY_UNTAGGED: SpecRecordType = SpecRecordType {
        name: "OnlyUntagged",
        fields: &[SpecFieldDecl::untagged("raw_code", EnumCellKind::Text)],
    };

    static MALFORMED: SpecRecordType = SpecRecordType {
        name: "Malformed",
        fields: &[
            SpecFieldDecl::scalar("id", "ID", EnumCellKind::Integer),
            SpecFieldDecl::scalar("name", "  ", EnumCellKind::Text),
        ],
    };

    static LOOP_A: SpecRecordType = SpecRecordType {
        name: "LoopA",
        fields: &[
            SpecFieldDecl::scalar("id", "ID", EnumCellKind::Integer),
            SpecFieldDecl::embedded("b", loop_b_type),
        ],
    };

    static LOOP_B: SpecRecordType = SpecRecordType {
        name: "LoopB",
        fields: &[SpecFieldDecl::embedded("a", loop_a_type)],
    };

    fn salary_type() -> &'static SpecRecordType {
        &SALARY
    }

    fn title_type() -> &'static SpecRecordType {
        &TITLE
    }

    fn loop_a_type() -> &'static SpecRecordType {
        &LOOP_A
    }

    fn loop_b_type() -> &'static SpecRecordType {
        &LOOP_B
    }

    #[test]
    fn extract_schema_flat_keeps_declaration_order() {
        let schema =
            extract_schema(Some(&SALARY), EnumUntaggedFieldRule::Identifier).expect("schema");
        assert_eq!(schema.width(), 3);
        assert_eq!(schema.header(), vec!["Employee ID", "Amount", "From Date"]);
        assert_eq!(schema.fields[1].path, vec!["amount"]);
        assert_eq!(schema.fields[1].kind, EnumCellKind::Float);
    }

    #[test]
    fn extract_schema_splices_embedded_records_in_place() {
        let schema =
            extract_schema(Some(&COMPOSITE), EnumUntaggedFieldRule::Identifier).expect("schema");
        assert_eq!(
            schema.header(),
            vec![
                "ID",
                "Employee ID",
                "Amount",
                "From Date",
                "Note",
                "Employee ID",
                "Title"
            ]
        );
        assert_eq!(schema.fields[2].path, vec!["salary", "amount"]);
        assert_eq!(schema.fields[4].path, vec!["note"]);
        assert_eq!(schema.fields[6].path_text(), "title.title");
    }

    #[test]
    fn extract_schema_is_idempotent() {
        let schema_a =
            extract_schema(Some(&COMPOSITE), EnumUntaggedFieldRule::Identifier).expect("schema");
        let schema_b =
            extract_schema(Some(&COMPOSITE), EnumUntaggedFieldRule::Identifier).expect("schema");
        assert_eq!(schema_a, schema_b);
    }

    #[test]
    fn extract_schema_untagged_rules() {
        let schema_ident =
            extract_schema(Some(&UNTAGGED), EnumUntaggedFieldRule::Identifier).expect("schema");
        assert_eq!(schema_ident.header(), vec!["ID", "raw_code"]);

        let schema_skip =
            extract_schema(Some(&UNTAGGED), EnumUntaggedFieldRule::Skip).expect("schema");
        assert_eq!(schema_skip.header(), vec!["ID"]);

        let err = extract_schema(Some(&ONLY_UNTAGGED), EnumUntaggedFieldRule::Skip)
            .expect_err("nothing to export");
        assert!(matches!(err, SchemaError::EmptySchema { .. }));
    }

    #[test]
    fn extract_schema_rejects_missing_and_malformed() {
        assert_eq!(
            extract_schema(None, EnumUntaggedFieldRule::Identifier),
            Err(SchemaError::MissingRecordType)
        );

        let err = extract_schema(Some(&MALFORMED), EnumUntaggedFieldRule::Identifier)
            .expect_err("blank annotation must fail");
        assert!(matches!(
            err,
            SchemaError::MalformedAnnotation { field: "name", .. }
        ));
    }

    #[test]
    fn extract_schema_rejects_recursive_embedding() {
        let err = extract_schema(Some(&LOOP_A), EnumUntaggedFieldRule::Identifier)
            .expect_err("loop must fail");
        assert_eq!(
            err,
            SchemaError::RecursiveEmbedding {
                record: "LoopA",
                path: "b.a".to_string(),
            }
        );
    }

    #[test]
    fn schema_cache_reuses_extracted_schema() {
        let cache = SchemaCache::new(EnumUntaggedFieldRule::Identifier);
        assert!(cache.is_empty());

        let schema_a = cache.get_or_extract_type(&COMPOSITE).expect("schema");
        let schema_b = cache.get_or_extract_type(&COMPOSITE).expect("schema");
        assert!(Arc::ptr_eq(&schema_a, &schema_b));
        assert_eq!(cache.len(), 1);
    }
}
