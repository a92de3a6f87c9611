// Copyright 2025 Oxide Computer Company

//! The Field Location Map
//!
//! A [`FieldLocationMap`] is computed once per bound type and HTTP method.  It
//! lists, for every property of the type, the wire location the property is
//! read from (or written to), the wire name, whether it's required, and its
//! default.  The decoder, the validator, the response encoder and the OpenAPI
//! generator all consume the same map, so none of them can disagree about
//! where a field lives.
//!
//! Building a map checks the bindings for configuration faults.  These are
//! programming errors in the bound type, not bad input, so they panic:
//!
//! * a binding for a property the type doesn't have,
//! * two bindings for the same property,
//! * two fields with the same wire name in the same location,
//! * a path, query, header, cookie or form parameter that isn't a scalar or
//!   an array of scalars (unless it's bound with `json_param`),
//! * a required property that has no location for the method.

use crate::bindings::Bindings;
use crate::bindings::FieldBinding;
use crate::coerce::ArrayStyle;
use crate::location::canonical_header_name;
use crate::location::ParamLocation;
use crate::schema::ScalarKind;
use crate::schema::ValueShape;
use crate::schema_util::schema2struct;
use crate::schema_util::StructMember;
use http::Method;
use schemars::gen::SchemaGenerator;
use schemars::gen::SchemaSettings;
use schemars::schema::InstanceType;
use schemars::schema::Schema;
use schemars::schema::SingleOrVec;
use schemars::JsonSchema;
use serde_json::Map;
use serde_json::Value;
use std::any::TypeId;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::OnceLock;
use std::sync::PoisonError;

/// One bound field.
#[derive(Clone, Debug)]
pub struct FieldEntry {
    pub location: ParamLocation,
    /// Name on the wire.  Header names are canonicalized.
    pub wire_name: String,
    /// Property name in the type's serialized form.
    pub property: String,
    pub required: bool,
    pub default: Option<Value>,
    pub description: Option<String>,
    pub json_param: bool,
    pub shape: ValueShape,
    /// How an array value travels.  Ignored for other shapes.
    pub array_style: ArrayStyle,
    /// OpenAPI 3.0 flavored schema, references point at
    /// `#/components/schemas/`.
    pub(crate) doc_schema: Schema,
    /// JSON Schema used for validation, with the type's `$defs` attached.
    pub(crate) validation_schema: Value,
}

impl FieldEntry {
    /// Key for this field in a validation error report.
    pub fn key(&self) -> String {
        self.location.key(&self.wire_name)
    }

    /// A required array sent as repeated keys has no way to say "empty"
    /// except leaving the key out, so an absent key decodes as `[]`.
    pub fn absent_means_empty(&self) -> bool {
        self.required
            && self.shape.is_array()
            && self.array_style == ArrayStyle::Repeated
            && matches!(
                self.location,
                ParamLocation::Query
                    | ParamLocation::Header
                    | ParamLocation::FormData
            )
    }
}

/// Path and cookie values can't repeat, so their arrays are delimited.
fn default_array_style(location: ParamLocation) -> ArrayStyle {
    match location {
        ParamLocation::Path | ParamLocation::Cookie => ArrayStyle::Delimited,
        _ => ArrayStyle::Repeated,
    }
}

/// How the JSON body relates to the bound type.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum BodyMode {
    /// Nothing is read from or written to the body.
    None,
    /// Body-located properties are the members of a JSON object body.
    Properties,
    /// The named property is the entire body.
    Whole(String),
    /// The type isn't struct-like (a list, a map, a scalar); the whole value
    /// is the body.  Only outputs use this mode.
    Entire,
}

#[derive(Debug)]
pub struct FieldLocationMap {
    type_name: String,
    entries: Vec<FieldEntry>,
    body_mode: BodyMode,
    deny_unknown: bool,
    forbid_unknown: BTreeSet<ParamLocation>,
    root_doc_schema: Schema,
    root_validation_schema: Value,
    doc_definitions: BTreeMap<String, Schema>,
    validation_defs: Map<String, Value>,
}

/// Whether a map describes a request or a response.
#[derive(Clone, Debug)]
pub(crate) enum Direction {
    Input(Method),
    Output,
}

/// The generated schemas of one bound type, in both flavors.
pub(crate) struct TypeSchemas {
    pub type_name: String,
    pub doc_root: Schema,
    pub doc_generator: SchemaGenerator,
    pub validation_root: Schema,
    pub validation_generator: SchemaGenerator,
}

impl TypeSchemas {
    pub fn for_type<T: JsonSchema>() -> TypeSchemas {
        let mut doc_generator =
            SchemaGenerator::new(SchemaSettings::openapi3());
        let doc_root = doc_generator.root_schema_for::<T>();
        let mut validation_generator =
            SchemaGenerator::new(SchemaSettings::draft2019_09());
        let validation_root = validation_generator.root_schema_for::<T>();

        // `root_schema_for` hands the definitions to the root rather than
        // leaving them in the generator; put them back so references resolve.
        doc_generator.definitions_mut().extend(doc_root.definitions);
        validation_generator
            .definitions_mut()
            .extend(validation_root.definitions);

        TypeSchemas {
            type_name: T::schema_name(),
            doc_root: doc_root.schema.into(),
            doc_generator,
            validation_root: validation_root.schema.into(),
            validation_generator,
        }
    }
}

type MapCache = Mutex<HashMap<(TypeId, Option<Method>), Arc<FieldLocationMap>>>;

fn map_cache() -> &'static MapCache {
    static CACHE: OnceLock<MapCache> = OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

impl FieldLocationMap {
    /// Returns the map for request type `T` and `method`, computing it on
    /// first use.
    pub fn for_input<T: JsonSchema + 'static>(
        method: &Method,
        bindings: impl FnOnce() -> Bindings,
    ) -> Arc<FieldLocationMap> {
        Self::cached::<T>(Some(method.clone()), || {
            FieldLocationMap::build(
                TypeSchemas::for_type::<T>(),
                &bindings(),
                Direction::Input(method.clone()),
            )
        })
    }

    /// Returns the map for response type `T`, computing it on first use.
    pub fn for_output<T: JsonSchema + 'static>(
        bindings: impl FnOnce() -> Bindings,
    ) -> Arc<FieldLocationMap> {
        Self::cached::<T>(None, || {
            FieldLocationMap::build(
                TypeSchemas::for_type::<T>(),
                &bindings(),
                Direction::Output,
            )
        })
    }

    fn cached<T: 'static>(
        method: Option<Method>,
        build: impl FnOnce() -> FieldLocationMap,
    ) -> Arc<FieldLocationMap> {
        let key = (TypeId::of::<T>(), method);
        if let Some(map) = map_cache()
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Arc::clone(map);
        }

        // Building happens outside the lock: it may panic on a bad binding.
        let built = Arc::new(build());
        let mut cache =
            map_cache().lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(cache.entry(key).or_insert(built))
    }

    pub(crate) fn build(
        schemas: TypeSchemas,
        bindings: &Bindings,
        direction: Direction,
    ) -> FieldLocationMap {
        let type_name = schemas.type_name.clone();
        let validation_defs = match serde_json::to_value(
            schemas.validation_generator.definitions(),
        ) {
            Ok(Value::Object(defs)) => defs,
            _ => Map::new(),
        };
        let root_validation_schema =
            with_defs(to_json(&schemas.validation_root), &validation_defs);
        let doc_definitions = schemas
            .doc_generator
            .definitions()
            .iter()
            .map(|(name, schema)| (name.clone(), schema.clone()))
            .collect();

        let mut map = FieldLocationMap {
            type_name,
            entries: Vec::new(),
            body_mode: BodyMode::None,
            deny_unknown: false,
            forbid_unknown: bindings.forbidden_unknown().clone(),
            root_doc_schema: schemas.doc_root.clone(),
            root_validation_schema,
            doc_definitions,
            validation_defs,
        };

        if let Direction::Output = direction {
            if !is_struct_like(&schemas.doc_root, &schemas.doc_generator) {
                if !bindings.fields().is_empty() {
                    panic!(
                        "{} has field bindings but is not a struct",
                        map.type_name
                    );
                }
                if !is_null(&schemas.doc_root) {
                    map.body_mode = BodyMode::Entire;
                }
                return map;
            }
        }

        let doc_shape = schema2struct(
            &map.type_name,
            &schemas.doc_root,
            &schemas.doc_generator,
        );
        let validation_shape = schema2struct(
            &map.type_name,
            &schemas.validation_root,
            &schemas.validation_generator,
        );
        map.deny_unknown = doc_shape.deny_unknown;
        if map.deny_unknown {
            map.forbid_unknown.insert(ParamLocation::Query);
            map.forbid_unknown.insert(ParamLocation::FormData);
        }

        let validation_members: HashMap<&str, &StructMember> = validation_shape
            .members
            .iter()
            .map(|m| (m.name.as_str(), m))
            .collect();
        let explicit =
            index_bindings(&map.type_name, bindings, &doc_shape.members);

        for member in &doc_shape.members {
            let validation_member = validation_members
                .get(member.name.as_str())
                .copied()
                .unwrap_or(member);
            let binding = explicit.get(member.name.as_str()).copied();
            let default = bindings
                .defaults()
                .iter()
                .find(|(property, _)| *property == member.name)
                .map(|(_, value)| value.clone())
                .or_else(|| validation_member.default.clone());

            let location = match placement(
                &map.type_name,
                member,
                binding,
                bindings.whole_body_property(),
                default.is_some(),
                &direction,
            ) {
                Some(location) => location,
                None => continue,
            };

            let validation_schema = with_defs(
                to_json(&validation_member.schema),
                &map.validation_defs,
            );
            let json_param = binding.map(|b| b.json_param).unwrap_or(false);
            let shape = if json_param {
                ValueShape::Json
            } else {
                let shape = ValueShape::from_schema(
                    &validation_schema,
                    &map.validation_defs,
                );
                match shape {
                    Some(shape) => shape,
                    None if location.is_parameter()
                        || location == ParamLocation::File =>
                    {
                        panic!(
                            "{} parameter \"{}\" of {} must be a scalar or an \
                             array of scalars (bind it with json_param to \
                             accept a JSON document)",
                            location, member.name, map.type_name
                        );
                    }
                    None => ValueShape::Json,
                }
            };

            let wire_name = match binding.and_then(|b| b.wire_name.clone()) {
                Some(name) => name,
                None => member.name.clone(),
            };
            let wire_name = match location {
                ParamLocation::Header => canonical_header_name(&wire_name),
                _ => wire_name,
            };
            let required = location == ParamLocation::Path
                || (member.required && default.is_none());

            let array_style = binding
                .and_then(|b| b.array_style)
                .unwrap_or_else(|| default_array_style(location));

            map.entries.push(FieldEntry {
                location,
                wire_name,
                property: member.name.clone(),
                required,
                default,
                description: member.description.clone(),
                json_param,
                shape,
                array_style,
                doc_schema: member.schema.clone(),
                validation_schema,
            });
        }

        map.body_mode = match bindings.whole_body_property() {
            Some(property) => {
                if map.entries_at(ParamLocation::Body).count() > 1 {
                    panic!(
                        "{} binds \"{}\" as the whole body, but other \
                         properties are in the body too",
                        map.type_name, property
                    );
                }
                BodyMode::Whole(property.to_string())
            }
            None if map.entries_at(ParamLocation::Body).next().is_some() => {
                BodyMode::Properties
            }
            None => BodyMode::None,
        };

        map.check_wire_names();
        map
    }

    /// Builds a map from entries produced outside of a Rust type, such as a
    /// dynamic record.
    pub(crate) fn from_entries(
        type_name: &str,
        entries: Vec<FieldEntry>,
        forbid_unknown: BTreeSet<ParamLocation>,
    ) -> FieldLocationMap {
        let mut doc_object = schemars::schema::ObjectValidation::default();
        let mut validation_properties = Map::new();
        for entry in &entries {
            doc_object
                .properties
                .insert(entry.property.clone(), entry.doc_schema.clone());
            validation_properties.insert(
                entry.property.clone(),
                entry.validation_schema.clone(),
            );
        }
        let has_body =
            entries.iter().any(|e| e.location == ParamLocation::Body);
        let body_mode = if has_body {
            BodyMode::Properties
        } else {
            BodyMode::None
        };
        let map = FieldLocationMap {
            type_name: type_name.to_string(),
            entries,
            body_mode,
            deny_unknown: false,
            forbid_unknown,
            root_doc_schema: schemars::schema::SchemaObject {
                instance_type: Some(InstanceType::Object.into()),
                object: Some(Box::new(doc_object)),
                ..Default::default()
            }
            .into(),
            root_validation_schema: serde_json::json!({
                "type": "object",
                "properties": validation_properties,
            }),
            doc_definitions: BTreeMap::new(),
            validation_defs: Map::new(),
        };
        map.check_wire_names();
        map
    }

    fn check_wire_names(&self) {
        let mut seen: HashMap<(ParamLocation, String), &str> = HashMap::new();
        for entry in &self.entries {
            let name = match entry.location {
                ParamLocation::Header => entry.wire_name.to_ascii_lowercase(),
                _ => entry.wire_name.clone(),
            };
            if let Some(other) =
                seen.insert((entry.location, name), entry.property.as_str())
            {
                panic!(
                    "{}: properties \"{}\" and \"{}\" are both bound to {} \
                     \"{}\"",
                    self.type_name,
                    other,
                    entry.property,
                    entry.location,
                    entry.wire_name
                );
            }
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn entries(&self) -> &[FieldEntry] {
        &self.entries
    }

    pub fn entries_at(
        &self,
        location: ParamLocation,
    ) -> impl Iterator<Item = &FieldEntry> + '_ {
        self.entries.iter().filter(move |e| e.location == location)
    }

    /// Looks up the entry at `location` for `wire_name`.  Header names match
    /// case-insensitively.
    pub fn entry(
        &self,
        location: ParamLocation,
        wire_name: &str,
    ) -> Option<&FieldEntry> {
        self.entries_at(location).find(|e| match location {
            ParamLocation::Header => {
                e.wire_name.eq_ignore_ascii_case(wire_name)
            }
            _ => e.wire_name == wire_name,
        })
    }

    pub fn entry_for_property(&self, property: &str) -> Option<&FieldEntry> {
        self.entries.iter().find(|e| e.property == property)
    }

    pub fn has_location(&self, location: ParamLocation) -> bool {
        self.entries_at(location).next().is_some()
    }

    pub fn body_mode(&self) -> &BodyMode {
        &self.body_mode
    }

    /// The type declares that it rejects unknown properties.
    pub fn deny_unknown(&self) -> bool {
        self.deny_unknown
    }

    /// Whether wire keys at `location` that match no entry are violations.
    pub fn forbids_unknown(&self, location: ParamLocation) -> bool {
        self.forbid_unknown.contains(&location)
    }

    pub(crate) fn root_doc_schema(&self) -> &Schema {
        &self.root_doc_schema
    }

    pub(crate) fn root_validation_schema(&self) -> &Value {
        &self.root_validation_schema
    }

    pub(crate) fn doc_definitions(&self) -> &BTreeMap<String, Schema> {
        &self.doc_definitions
    }

    pub(crate) fn validation_defs(&self) -> &Map<String, Value> {
        &self.validation_defs
    }
}

/// Indexes the explicit bindings by property, checking that each names a
/// property of the type and appears only once.
fn index_bindings<'a>(
    type_name: &str,
    bindings: &'a Bindings,
    members: &[StructMember],
) -> HashMap<&'a str, &'a FieldBinding> {
    let known: BTreeSet<&str> =
        members.iter().map(|m| m.name.as_str()).collect();
    let mut explicit = HashMap::new();
    let bound_properties = bindings
        .fields()
        .iter()
        .map(|b| (b.property.as_str(), Some(b)))
        .chain(bindings.whole_body_property().map(|p| (p, None)))
        .chain(bindings.defaults().iter().map(|(p, _)| (p.as_str(), None)));
    for (property, binding) in bound_properties {
        if !known.contains(property) {
            panic!(
                "{} has no property \"{}\" (properties are named as serde \
                 names them)",
                type_name, property
            );
        }
        if let Some(binding) = binding {
            if explicit.insert(property, binding).is_some() {
                panic!(
                    "{}: property \"{}\" is bound twice",
                    type_name, property
                );
            }
        }
    }
    explicit
}

/// Decides where a member lives, or `None` if it is not on the wire at all.
fn placement(
    type_name: &str,
    member: &StructMember,
    binding: Option<&FieldBinding>,
    whole_body: Option<&str>,
    has_default: bool,
    direction: &Direction,
) -> Option<ParamLocation> {
    if let Some(binding) = binding {
        if let Direction::Output = direction {
            if !matches!(
                binding.location,
                ParamLocation::Header | ParamLocation::Body
            ) {
                panic!(
                    "{}: response property \"{}\" can't be bound to {}",
                    type_name, member.name, binding.location
                );
            }
        }
        if binding.location == ParamLocation::Body && whole_body.is_some() {
            panic!(
                "{}: property \"{}\" is bound to the body, but the body is \
                 the whole of another property",
                type_name, member.name
            );
        }
        return Some(binding.location);
    }

    if whole_body == Some(member.name.as_str()) {
        return Some(ParamLocation::Body);
    }

    let body_allowed = match direction {
        Direction::Input(method) => {
            whole_body.is_none() && method_has_body(method)
        }
        Direction::Output => whole_body.is_none(),
    };
    if body_allowed {
        return Some(ParamLocation::Body);
    }

    if member.required && !has_default {
        let reason = match direction {
            Direction::Input(method) if whole_body.is_none() => {
                format!("{} requests have no body", method)
            }
            _ => "the body is taken by another property".to_string(),
        };
        panic!(
            "{}: required property \"{}\" has no location ({})",
            type_name, member.name, reason
        );
    }
    None
}

/// Methods without conventional body semantics.
pub fn method_has_body(method: &Method) -> bool {
    !matches!(*method, Method::GET | Method::HEAD | Method::DELETE)
}

fn to_json(schema: &Schema) -> Value {
    serde_json::to_value(schema).unwrap_or(Value::Bool(true))
}

fn with_defs(mut schema: Value, defs: &Map<String, Value>) -> Value {
    if defs.is_empty() {
        return schema;
    }
    if let Value::Object(object) = &mut schema {
        object.insert("$defs".to_string(), Value::Object(defs.clone()));
    }
    schema
}

fn is_struct_like(schema: &Schema, generator: &SchemaGenerator) -> bool {
    let schema = match generator.dereference(schema) {
        Some(target) => target,
        None => schema,
    };
    match schema {
        Schema::Object(object) => {
            match &object.instance_type {
                Some(SingleOrVec::Single(ty))
                    if **ty == InstanceType::Object =>
                {
                    // Maps have `additionalProperties` and no properties.
                    match &object.object {
                        Some(validation) => {
                            !validation.properties.is_empty()
                                || !matches!(
                                    validation.additional_properties.as_deref(),
                                    Some(Schema::Object(_))
                                        | Some(Schema::Bool(true))
                                )
                        }
                        None => true,
                    }
                }
                None => object.subschemas.is_some() && object.object.is_none(),
                _ => false,
            }
        }
        Schema::Bool(_) => false,
    }
}

fn is_null(schema: &Schema) -> bool {
    matches!(
        schema,
        Schema::Object(schemars::schema::SchemaObject {
            instance_type: Some(SingleOrVec::Single(ty)),
            ..
        }) if **ty == InstanceType::Null
    )
}

/// Builds an entry for a field whose schema is given directly as JSON, as
/// dynamic records do.
pub(crate) fn entry_from_json_schema(
    location: ParamLocation,
    wire_name: &str,
    required: bool,
    schema: Value,
) -> FieldEntry {
    let shape = ValueShape::from_schema(&schema, &Map::new()).unwrap_or(
        if location.is_parameter() {
            ValueShape::Scalar { kind: ScalarKind::String, nullable: false }
        } else {
            ValueShape::Json
        },
    );
    let doc_schema = serde_json::from_value(schema.clone())
        .unwrap_or(Schema::Bool(true));
    let property = wire_name.to_string();
    let wire_name = match location {
        ParamLocation::Header => canonical_header_name(wire_name),
        _ => property.clone(),
    };
    FieldEntry {
        location,
        property,
        wire_name,
        required,
        default: None,
        description: None,
        json_param: matches!(shape, ValueShape::Json)
            && location.is_parameter(),
        shape,
        array_style: default_array_style(location),
        doc_schema,
        validation_schema: schema,
    }
}
