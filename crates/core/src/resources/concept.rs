//! The concept dictionary: `concept`, its `name` and `mapping` sub-resources, and the
//! `conceptdescription` converter used for nested descriptions.

use super::{child_uri, keep_single_preferred, linked, metadata_id};
use crate::accessors::{PropertyAccessors, PropertyValue};
use crate::constants::{REPRESENTATION_FULL_CHILDREN, REPRESENTATION_FULL_CHILDREN_INTERNAL};
use crate::context::RequestContext;
use crate::convert;
use crate::cycles::assert_no_cycles;
use crate::description::{FieldSet, ResourceDescription};
use crate::paging::PageableResult;
use crate::representation::Representation;
use crate::resource::{
    as_representation, check_required, not_supported, set_converted_properties, CrudHandler,
    Lifecycle, Representable, SubResourceHandler,
};
use crate::schema::PropertyType;
use crate::{RestError, RestResult};
use emr_domain::{
    AuditInfo, Concept, ConceptDescription, ConceptMap, ConceptName, ConceptNumeric, DatatypeKind,
    EntityUuid, MetadataKind,
};
use serde_json::{Map, Value};

pub const PARAM_ANSWER_TO: &str = "answerTo";
pub const PARAM_MEMBER_OF: &str = "memberOf";

const DEFAULT_LOCALE: &str = "en";
const FULLY_SPECIFIED: &str = "FULLY_SPECIFIED";

const NUMERIC_PROPERTIES: [&str; 8] = [
    "hiNormal",
    "hiAbsolute",
    "hiCritical",
    "lowNormal",
    "lowAbsolute",
    "lowCritical",
    "units",
    "precise",
];

// ===== CONCEPT =====

pub struct ConceptResource {
    accessors: PropertyAccessors<Concept>,
}

impl Default for ConceptResource {
    fn default() -> Self {
        Self::new()
    }
}

macro_rules! numeric_range {
    ($accessors:expr, $($name:literal => $field:ident),+ $(,)?) => {
        $accessors$(.property(
            $name,
            |c, _| Ok(PropertyValue::number(c.numeric.as_ref().and_then(|n| n.$field))),
            |c, v, _| {
                numeric_mut(c, $name)?.$field = convert::optional_number($name, v)?;
                Ok(())
            },
        ))+
    };
}

impl ConceptResource {
    pub fn new() -> Self {
        let accessors = PropertyAccessors::<Concept>::new()
            .get("display", |c, _| Ok(c.display_name().into()))
            .property(
                "name",
                |c, _| Ok(PropertyValue::optional_delegate(c.name().cloned())),
                set_fully_specified_name,
            )
            .property(
                "datatype",
                |c, ctx| {
                    linked(c.datatype.as_ref(), |id| {
                        ctx.services().concepts.get_datatype(id)
                    })
                },
                |c, v, ctx| {
                    let concepts = &ctx.services().concepts;
                    let datatype = super::resolve_required("datatype", v, |id| {
                        match concepts.get_datatype(id)? {
                            Some(found) => Ok(Some(found)),
                            None => concepts.get_datatype_by_name(id),
                        }
                    })?;
                    if datatype.kind() == DatatypeKind::Numeric && c.numeric.is_none() {
                        c.numeric = Some(ConceptNumeric::default());
                    }
                    c.datatype = Some(datatype.uuid);
                    Ok(())
                },
            )
            .property(
                "conceptClass",
                |c, ctx| {
                    linked(c.concept_class.as_ref(), |id| {
                        ctx.services()
                            .metadata
                            .get_metadata(MetadataKind::ConceptClass, id)
                    })
                },
                |c, v, ctx| {
                    c.concept_class = metadata_id(MetadataKind::ConceptClass, "conceptClass", v, ctx)?;
                    Ok(())
                },
            )
            .property(
                "set",
                |c, _| Ok(c.set.into()),
                |c, v, _| {
                    c.set = convert::parse_boolean("set", v)?;
                    Ok(())
                },
            )
            .property(
                "version",
                |c, _| Ok(c.version.clone().into()),
                |c, v, _| {
                    c.version = convert::optional_string("version", v)?;
                    Ok(())
                },
            )
            .property(
                "names",
                |c, _| {
                    Ok(PropertyValue::delegates(
                        c.names.iter().filter(|n| !n.void.voided).cloned(),
                    ))
                },
                set_names,
            )
            .property(
                "descriptions",
                |c, _| Ok(PropertyValue::delegates(c.descriptions.iter().cloned())),
                set_descriptions,
            )
            .property(
                "mappings",
                |c, _| Ok(PropertyValue::delegates(c.mappings.iter().cloned())),
                set_mappings,
            )
            .property(
                "answers",
                |c, ctx| Ok(PropertyValue::delegates(resolve_concepts(&c.answers, ctx)?)),
                |c, v, ctx| {
                    c.answers = concept_ids("answers", v, ctx)?;
                    Ok(())
                },
            )
            .property(
                "setMembers",
                |c, ctx| Ok(PropertyValue::delegates(resolve_concepts(&c.set_members, ctx)?)),
                |c, v, ctx| {
                    c.set_members = concept_ids("setMembers", v, ctx)?;
                    c.set = !c.set_members.is_empty();
                    Ok(())
                },
            )
            .property(
                "units",
                |c, _| Ok(c.numeric.as_ref().and_then(|n| n.units.clone()).into()),
                |c, v, _| {
                    numeric_mut(c, "units")?.units = convert::optional_string("units", v)?;
                    Ok(())
                },
            )
            .property(
                "precise",
                |c, _| Ok(c.numeric.as_ref().map_or(PropertyValue::Null, |n| n.precise.into())),
                |c, v, _| {
                    numeric_mut(c, "precise")?.precise = convert::parse_boolean("precise", v)?;
                    Ok(())
                },
            );
        let accessors = numeric_range!(accessors,
            "hiNormal" => hi_normal,
            "hiAbsolute" => hi_absolute,
            "hiCritical" => hi_critical,
            "lowNormal" => low_normal,
            "lowAbsolute" => low_absolute,
            "lowCritical" => low_critical,
        );
        Self { accessors }
    }

    fn full_description(delegate: Option<&Concept>) -> ResourceDescription {
        let mut description = ResourceDescription::new();
        description
            .add_property("uuid")
            .add_property("display")
            .add_property_as("name", Representation::Default)
            .add_property_as("datatype", Representation::Default)
            .add_property_as("conceptClass", Representation::Default)
            .add_property("set")
            .add_property("version")
            .add_property("retired")
            .add_property_as("names", Representation::Default)
            .add_property_as("descriptions", Representation::Default)
            .add_property_as("mappings", Representation::Default)
            .add_property_as("answers", Representation::Default)
            .add_property_as("setMembers", Representation::Default)
            .add_property("auditInfo")
            .add_self_link();
        if delegate.map_or(false, |c| c.numeric.is_some()) {
            for property in NUMERIC_PROPERTIES {
                description.add_property(property);
            }
        }
        description
    }
}

fn numeric_mut<'a>(concept: &'a mut Concept, property: &str) -> RestResult<&'a mut ConceptNumeric> {
    concept.numeric.as_mut().ok_or_else(|| {
        RestError::conversion(property, format!("{property} can only be set on a numeric concept"))
    })
}

fn resolve_concepts(ids: &[EntityUuid], ctx: &RequestContext) -> RestResult<Vec<Concept>> {
    let mut concepts = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(concept) = ctx.services().concepts.get_concept(id.as_str())? {
            concepts.push(concept);
        }
    }
    Ok(concepts)
}

/// Concept ids from a list of references. A drug reference stands for its concept.
fn concept_ids(property: &str, value: &Value, ctx: &RequestContext) -> RestResult<Vec<EntityUuid>> {
    let concepts = &ctx.services().concepts;
    let mut ids = Vec::new();
    for item in convert::array(property, value)? {
        let Some(id) = convert::reference_id(property, item)? else {
            continue;
        };
        let concept = match concepts.get_concept(&id)? {
            Some(concept) => Some(concept.uuid),
            None => concepts.get_drug(&id)?.and_then(|d| d.concept),
        };
        let concept = concept.ok_or_else(|| {
            RestError::conversion(property, format!("There is no concept or drug with given uuid: {id}"))
        })?;
        if !ids.contains(&concept) {
            ids.push(concept);
        }
    }
    Ok(ids)
}

/// Replaces the fully specified name in the default locale, adding one if there is none.
fn set_fully_specified_name(concept: &mut Concept, value: &Value, _ctx: &RequestContext) -> RestResult<()> {
    let name = convert::string("name", value)?;
    if name.trim().is_empty() {
        return Err(RestError::conversion("name", "name cannot be blank"));
    }
    let existing = concept
        .names
        .iter_mut()
        .find(|n| !n.void.voided && n.is_fully_specified() && n.locale == DEFAULT_LOCALE);
    match existing {
        Some(existing) => existing.name = name,
        None => {
            let preferred = !concept.names.iter().any(|n| !n.void.voided && n.locale_preferred);
            concept.names.push(ConceptName {
                concept: Some(concept.uuid.clone()),
                name,
                locale: DEFAULT_LOCALE.into(),
                locale_preferred: preferred,
                concept_name_type: Some(FULLY_SPECIFIED.into()),
                ..Default::default()
            });
        }
    }
    Ok(())
}

/// Two names are the same if they share a uuid, or a name, type and locale.
fn same_name(left: &ConceptName, right: &ConceptName) -> bool {
    left.uuid == right.uuid
        || (left.name == right.name
            && left.concept_name_type == right.concept_name_type
            && left.locale == right.locale)
}

/// Makes the concept's names match the posted list: names not posted are removed, names posted
/// again are kept, new names are added.
fn set_names(concept: &mut Concept, value: &Value, ctx: &RequestContext) -> RestResult<()> {
    let handler = ConceptNameResource::new();
    let allowed = handler.creatable_properties()?;
    let mut posted = Vec::new();
    for item in convert::array("names", value)? {
        let body = convert::object("names", item)?;
        check_required(&allowed, body)?;
        let mut name = handler.new_child(concept);
        set_converted_properties(&handler, &mut name, body, &allowed, ctx)?;
        posted.push(name);
    }
    concept
        .names
        .retain(|existing| posted.iter().any(|p| same_name(existing, p)));
    for name in posted {
        if !concept.names.iter().any(|existing| same_name(existing, &name)) {
            concept.names.push(name);
        }
    }
    Ok(())
}

fn set_descriptions(concept: &mut Concept, value: &Value, ctx: &RequestContext) -> RestResult<()> {
    let handler = ConceptDescriptionConverter::new();
    let allowed = handler.creatable_properties()?;
    let mut posted = Vec::new();
    for item in convert::array("descriptions", value)? {
        let body = convert::object("descriptions", item)?;
        check_required(&allowed, body)?;
        let mut description = ConceptDescription::default();
        set_converted_properties(&handler, &mut description, body, &allowed, ctx)?;
        posted.push(description);
    }
    let same = |left: &ConceptDescription, right: &ConceptDescription| {
        left.uuid == right.uuid || (left.description == right.description && left.locale == right.locale)
    };
    concept
        .descriptions
        .retain(|existing| posted.iter().any(|p| same(existing, p)));
    for description in posted {
        if !concept.descriptions.iter().any(|existing| same(existing, &description)) {
            concept.descriptions.push(description);
        }
    }
    Ok(())
}

/// Mappings are replaced wholesale.
fn set_mappings(concept: &mut Concept, value: &Value, ctx: &RequestContext) -> RestResult<()> {
    let handler = ConceptMapResource::new();
    let allowed = handler.creatable_properties()?;
    let mut mappings = Vec::new();
    for item in convert::array("mappings", value)? {
        let body = convert::object("mappings", item)?;
        check_required(&allowed, body)?;
        let mut mapping = handler.new_child(concept);
        set_converted_properties(&handler, &mut mapping, body, &allowed, ctx)?;
        mappings.push(mapping);
    }
    concept.mappings = mappings;
    Ok(())
}

impl Representable for ConceptResource {
    type Delegate = Concept;

    fn name(&self) -> &'static str {
        "concept"
    }

    fn accessors(&self) -> &PropertyAccessors<Concept> {
        &self.accessors
    }

    fn identifier<'a>(&self, delegate: &'a Concept) -> &'a str {
        delegate.uuid.as_str()
    }

    fn lifecycle(&self, delegate: &Concept) -> Lifecycle {
        Lifecycle::Retireable {
            retired: delegate.retire.retired,
        }
    }

    fn audit<'a>(&self, delegate: &'a Concept) -> Option<&'a AuditInfo> {
        Some(&delegate.audit)
    }

    fn representation_description(
        &self,
        rep: &Representation,
        delegate: Option<&Concept>,
    ) -> Option<ResourceDescription> {
        match rep {
            Representation::Default => {
                let mut description = ResourceDescription::new();
                description
                    .add_property("uuid")
                    .add_property("display")
                    .add_property_as("name", Representation::Default)
                    .add_property_as("datatype", Representation::Ref)
                    .add_property_as("conceptClass", Representation::Ref)
                    .add_property("set")
                    .add_property("version")
                    .add_property("retired")
                    .add_property_as("names", Representation::Ref)
                    .add_property_as("descriptions", Representation::Ref)
                    .add_property_as("mappings", Representation::Ref)
                    .add_property_as("answers", Representation::Ref)
                    .add_property_as("setMembers", Representation::Ref)
                    .add_self_link()
                    .add_link("full", ".?v=full");
                Some(description)
            }
            Representation::Full => Some(Self::full_description(delegate)),
            Representation::Named(name) if name == REPRESENTATION_FULL_CHILDREN_INTERNAL => {
                let mut description = Self::full_description(delegate);
                description
                    .remove_property("setMembers")
                    .add_property_as(
                        "setMembers",
                        Representation::Named(REPRESENTATION_FULL_CHILDREN_INTERNAL.into()),
                    )
                    .remove_property("answers")
                    .add_property_as("answers", Representation::Full);
                Some(description)
            }
            _ => None,
        }
    }

    /// `fullchildren` expands set members recursively, after checking the membership graph has
    /// no cycles.
    fn render_named(
        &self,
        name: &str,
        delegate: &Concept,
        ctx: &RequestContext,
    ) -> Option<RestResult<Value>> {
        if name != REPRESENTATION_FULL_CHILDREN {
            return None;
        }
        let members = |uuid: &str| -> RestResult<Vec<String>> {
            let members = if uuid == delegate.uuid.as_str() {
                delegate.set_members.clone()
            } else {
                ctx.services()
                    .concepts
                    .get_concept(uuid)?
                    .map(|c| c.set_members)
                    .unwrap_or_default()
            };
            Ok(members.iter().map(ToString::to_string).collect())
        };
        let rendered = assert_no_cycles(delegate.uuid.as_str(), members).and_then(|visited| {
            tracing::debug!(concept = %delegate.uuid, visited, "rendering full children");
            as_representation(
                self,
                delegate,
                &Representation::Named(REPRESENTATION_FULL_CHILDREN_INTERNAL.into()),
                ctx,
            )
        });
        Some(rendered)
    }

    fn creatable_properties(&self) -> RestResult<FieldSet> {
        let mut fields = FieldSet::new();
        fields
            .add_required("names")
            .add_required("datatype")
            .add_required("conceptClass")
            .add("descriptions")
            .add("set")
            .add("version")
            .add("mappings")
            .add("answers")
            .add("setMembers");
        for property in NUMERIC_PROPERTIES {
            fields.add(property);
        }
        Ok(fields)
    }

    fn updatable_properties(&self) -> RestResult<FieldSet> {
        let mut fields = self.creatable_properties()?.all_optional();
        fields.add("name");
        Ok(fields)
    }

    fn property_type(&self, name: &str) -> PropertyType {
        match name {
            "name" => PropertyType::Owned("conceptname"),
            "datatype" => PropertyType::Ref("conceptdatatype"),
            "conceptClass" => PropertyType::Ref("conceptclass"),
            "set" | "precise" => PropertyType::Boolean,
            "names" => PropertyType::OwnedList("conceptname"),
            "descriptions" => PropertyType::OwnedList("conceptdescription"),
            "mappings" => PropertyType::OwnedList("conceptmap"),
            "answers" | "setMembers" => PropertyType::RefList("concept"),
            "hiNormal" | "hiAbsolute" | "hiCritical" | "lowNormal" | "lowAbsolute"
            | "lowCritical" => PropertyType::Number,
            other => PropertyType::common(other),
        }
    }
}

impl CrudHandler for ConceptResource {
    fn fetch(&self, id: &str, ctx: &RequestContext) -> RestResult<Option<Concept>> {
        let concepts = &ctx.services().concepts;
        match concepts.get_concept(id)? {
            Some(concept) => Ok(Some(concept)),
            None => Ok(concepts.get_concept_by_name(id)?),
        }
    }

    fn new_delegate(&self, _body: &Map<String, Value>, _ctx: &RequestContext) -> RestResult<Concept> {
        Ok(Concept::default())
    }

    fn save(&self, delegate: Concept, ctx: &RequestContext) -> RestResult<Concept> {
        Ok(ctx.services().concepts.save_concept(delegate)?)
    }

    fn delete_delegate(&self, mut delegate: Concept, reason: &str, ctx: &RequestContext) -> RestResult<()> {
        if delegate.retire.retire(reason) {
            ctx.services().concepts.save_concept(delegate)?;
        }
        Ok(())
    }

    fn undelete_delegate(&self, mut delegate: Concept, _ctx: &RequestContext) -> RestResult<Concept> {
        delegate.retire.unretire();
        Ok(delegate)
    }

    fn purge_delegate(&self, delegate: Option<Concept>, ctx: &RequestContext) -> RestResult<()> {
        if let Some(concept) = delegate {
            ctx.services().concepts.purge_concept(concept.uuid.as_str())?;
        }
        Ok(())
    }

    fn list_all(&self, ctx: &RequestContext) -> RestResult<PageableResult<Concept>> {
        Ok(ctx
            .services()
            .concepts
            .get_all_concepts(ctx.include_all())?
            .into())
    }

    /// `answerTo` narrows to the answers of a question, `memberOf` to the members of a set and
    /// `q` to matching names. A scope that names no concept yields an empty result.
    fn search_delegates(&self, ctx: &RequestContext) -> RestResult<PageableResult<Concept>> {
        let concepts = &ctx.services().concepts;
        let query = super::query_text(ctx);
        let answer_to = ctx.param(PARAM_ANSWER_TO);
        let member_of = ctx.param(PARAM_MEMBER_OF);
        if query.is_empty() && answer_to.is_none() && member_of.is_none() {
            return Ok(PageableResult::Empty);
        }

        let mut candidates = match answer_to {
            Some(question) => {
                let Some(question) = concepts.get_concept(question)? else {
                    tracing::debug!(answer_to = question, "answerTo names no concept");
                    return Ok(PageableResult::Empty);
                };
                resolve_concepts(&question.answers, ctx)?
            }
            None if !query.is_empty() => concepts.search_concepts(&query, ctx.include_all())?,
            None => concepts.get_all_concepts(ctx.include_all())?,
        };

        if !query.is_empty() {
            let needle = query.to_lowercase();
            candidates.retain(|c| {
                c.names
                    .iter()
                    .any(|n| !n.void.voided && n.name.to_lowercase().contains(&needle))
            });
        }
        if let Some(set) = member_of {
            let Some(set) = concepts.get_concept(set)? else {
                tracing::debug!(member_of = set, "memberOf names no concept");
                return Ok(PageableResult::Empty);
            };
            candidates.retain(|c| set.set_members.contains(&c.uuid));
        }
        if !ctx.include_all() {
            candidates.retain(|c| !c.retire.retired);
        }
        Ok(PageableResult::NeedsPaging(candidates))
    }
}

// ===== CONCEPT NAME =====

pub struct ConceptNameResource {
    accessors: PropertyAccessors<ConceptName>,
}

impl Default for ConceptNameResource {
    fn default() -> Self {
        Self::new()
    }
}

impl ConceptNameResource {
    pub fn new() -> Self {
        let accessors = PropertyAccessors::<ConceptName>::new()
            .get("display", |n, _| Ok(n.name.as_str().into()))
            .property(
                "name",
                |n, _| Ok(n.name.as_str().into()),
                |n, v, _| {
                    n.name = convert::string("name", v)?;
                    Ok(())
                },
            )
            .property(
                "locale",
                |n, _| Ok(n.locale.as_str().into()),
                |n, v, _| {
                    n.locale = convert::string("locale", v)?;
                    Ok(())
                },
            )
            .property(
                "localePreferred",
                |n, _| Ok(n.locale_preferred.into()),
                |n, v, _| {
                    n.locale_preferred = convert::parse_boolean("localePreferred", v)?;
                    Ok(())
                },
            )
            .property(
                "conceptNameType",
                |n, _| Ok(n.concept_name_type.clone().into()),
                |n, v, _| {
                    n.concept_name_type =
                        convert::optional_string("conceptNameType", v)?.map(|t| t.to_uppercase());
                    Ok(())
                },
            );
        Self { accessors }
    }
}

impl Representable for ConceptNameResource {
    type Delegate = ConceptName;

    fn name(&self) -> &'static str {
        "conceptname"
    }

    fn accessors(&self) -> &PropertyAccessors<ConceptName> {
        &self.accessors
    }

    fn identifier<'a>(&self, delegate: &'a ConceptName) -> &'a str {
        delegate.uuid.as_str()
    }

    fn lifecycle(&self, delegate: &ConceptName) -> Lifecycle {
        Lifecycle::Voidable {
            voided: delegate.void.voided,
        }
    }

    fn audit<'a>(&self, delegate: &'a ConceptName) -> Option<&'a AuditInfo> {
        Some(&delegate.audit)
    }

    fn uri(&self, delegate: &ConceptName, ctx: &RequestContext) -> String {
        child_uri(ctx, "concept", delegate.concept.as_ref(), "name", &delegate.uuid)
    }

    fn representation_description(
        &self,
        rep: &Representation,
        _delegate: Option<&ConceptName>,
    ) -> Option<ResourceDescription> {
        let full = match rep {
            Representation::Default => false,
            Representation::Full => true,
            _ => return None,
        };
        let mut description = ResourceDescription::new();
        description
            .add_property("uuid")
            .add_property("display")
            .add_property("name")
            .add_property("locale")
            .add_property("localePreferred")
            .add_property("conceptNameType");
        if full {
            description.add_property("voided").add_property("auditInfo");
        }
        description.add_self_link();
        if !full {
            description.add_link("full", ".?v=full");
        }
        Some(description)
    }

    fn creatable_properties(&self) -> RestResult<FieldSet> {
        let mut fields = FieldSet::new();
        fields
            .add_required("name")
            .add_required("locale")
            .add("localePreferred")
            .add("conceptNameType");
        Ok(fields)
    }

    fn property_type(&self, name: &str) -> PropertyType {
        match name {
            "localePreferred" => PropertyType::Boolean,
            other => PropertyType::common(other),
        }
    }
}

impl SubResourceHandler for ConceptNameResource {
    type Parent = Concept;

    fn parent_resource(&self) -> &'static str {
        "concept"
    }

    fn path(&self) -> &'static str {
        "name"
    }

    fn fetch_parent(&self, id: &str, ctx: &RequestContext) -> RestResult<Option<Concept>> {
        ConceptResource::new().fetch(id, ctx)
    }

    fn children<'a>(&self, parent: &'a Concept) -> &'a [ConceptName] {
        &parent.names
    }

    fn children_mut<'a>(&self, parent: &'a mut Concept) -> &'a mut Vec<ConceptName> {
        &mut parent.names
    }

    fn new_child(&self, parent: &Concept) -> ConceptName {
        ConceptName {
            concept: Some(parent.uuid.clone()),
            ..Default::default()
        }
    }

    fn save_parent(&self, parent: Concept, ctx: &RequestContext) -> RestResult<Concept> {
        Ok(ctx.services().concepts.save_concept(parent)?)
    }

    fn void_child(&self, child: &mut ConceptName, reason: &str) -> RestResult<bool> {
        Ok(child.void.void(reason))
    }

    fn unvoid_child(&self, child: &mut ConceptName) -> RestResult<()> {
        child.void.unvoid();
        Ok(())
    }

    fn after_change(&self, parent: &mut Concept, child_id: &str) -> RestResult<()> {
        keep_single_preferred(
            &mut parent.names,
            child_id,
            |n| &n.uuid,
            |n| &mut n.locale_preferred,
        );
        Ok(())
    }
}

// ===== CONCEPT MAPPING =====

pub struct ConceptMapResource {
    accessors: PropertyAccessors<ConceptMap>,
}

impl Default for ConceptMapResource {
    fn default() -> Self {
        Self::new()
    }
}

impl ConceptMapResource {
    pub fn new() -> Self {
        let accessors = PropertyAccessors::<ConceptMap>::new()
            .get("display", |m, _| Ok(format!("{}: {}", m.source, m.source_code).into()))
            .property(
                "source",
                |m, _| Ok(m.source.as_str().into()),
                |m, v, _| {
                    m.source = convert::string("source", v)?;
                    Ok(())
                },
            )
            .property(
                "sourceCode",
                |m, _| Ok(m.source_code.as_str().into()),
                |m, v, _| {
                    m.source_code = convert::string("sourceCode", v)?;
                    Ok(())
                },
            )
            .property(
                "comment",
                |m, _| Ok(m.comment.clone().into()),
                |m, v, _| {
                    m.comment = convert::optional_string("comment", v)?;
                    Ok(())
                },
            );
        Self { accessors }
    }
}

impl Representable for ConceptMapResource {
    type Delegate = ConceptMap;

    fn name(&self) -> &'static str {
        "conceptmap"
    }

    fn accessors(&self) -> &PropertyAccessors<ConceptMap> {
        &self.accessors
    }

    fn identifier<'a>(&self, delegate: &'a ConceptMap) -> &'a str {
        delegate.uuid.as_str()
    }

    fn audit<'a>(&self, delegate: &'a ConceptMap) -> Option<&'a AuditInfo> {
        Some(&delegate.audit)
    }

    fn uri(&self, delegate: &ConceptMap, ctx: &RequestContext) -> String {
        child_uri(ctx, "concept", delegate.concept.as_ref(), "mapping", &delegate.uuid)
    }

    fn representation_description(
        &self,
        rep: &Representation,
        _delegate: Option<&ConceptMap>,
    ) -> Option<ResourceDescription> {
        let full = match rep {
            Representation::Default => false,
            Representation::Full => true,
            _ => return None,
        };
        let mut description = ResourceDescription::new();
        description
            .add_property("uuid")
            .add_property("display")
            .add_property("source")
            .add_property("sourceCode")
            .add_property("comment");
        if full {
            description.add_property("auditInfo");
        }
        description.add_self_link();
        if !full {
            description.add_link("full", ".?v=full");
        }
        Some(description)
    }

    fn creatable_properties(&self) -> RestResult<FieldSet> {
        let mut fields = FieldSet::new();
        fields
            .add_required("source")
            .add_required("sourceCode")
            .add("comment");
        Ok(fields)
    }
}

impl SubResourceHandler for ConceptMapResource {
    type Parent = Concept;

    fn parent_resource(&self) -> &'static str {
        "concept"
    }

    fn path(&self) -> &'static str {
        "mapping"
    }

    fn fetch_parent(&self, id: &str, ctx: &RequestContext) -> RestResult<Option<Concept>> {
        ConceptResource::new().fetch(id, ctx)
    }

    fn children<'a>(&self, parent: &'a Concept) -> &'a [ConceptMap] {
        &parent.mappings
    }

    fn children_mut<'a>(&self, parent: &'a mut Concept) -> &'a mut Vec<ConceptMap> {
        &mut parent.mappings
    }

    fn new_child(&self, parent: &Concept) -> ConceptMap {
        ConceptMap {
            concept: Some(parent.uuid.clone()),
            ..Default::default()
        }
    }

    fn save_parent(&self, parent: Concept, ctx: &RequestContext) -> RestResult<Concept> {
        Ok(ctx.services().concepts.save_concept(parent)?)
    }

    /// Mappings carry no void state; they can only be purged.
    fn void_child(&self, _child: &mut ConceptMap, _reason: &str) -> RestResult<bool> {
        Err(not_supported(self.name(), "delete without purge"))
    }
}

// ===== CONCEPT DESCRIPTION =====

/// Renders and reads nested concept descriptions; they have no endpoint of their own.
pub struct ConceptDescriptionConverter {
    accessors: PropertyAccessors<ConceptDescription>,
}

impl Default for ConceptDescriptionConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl ConceptDescriptionConverter {
    pub fn new() -> Self {
        let accessors = PropertyAccessors::<ConceptDescription>::new()
            .get("display", |d, _| Ok(d.description.as_str().into()))
            .property(
                "description",
                |d, _| Ok(d.description.as_str().into()),
                |d, v, _| {
                    d.description = convert::string("description", v)?;
                    Ok(())
                },
            )
            .property(
                "locale",
                |d, _| Ok(d.locale.as_str().into()),
                |d, v, _| {
                    d.locale = convert::string("locale", v)?;
                    Ok(())
                },
            );
        Self { accessors }
    }
}

impl Representable for ConceptDescriptionConverter {
    type Delegate = ConceptDescription;

    fn name(&self) -> &'static str {
        "conceptdescription"
    }

    fn accessors(&self) -> &PropertyAccessors<ConceptDescription> {
        &self.accessors
    }

    fn identifier<'a>(&self, delegate: &'a ConceptDescription) -> &'a str {
        delegate.uuid.as_str()
    }

    fn representation_description(
        &self,
        rep: &Representation,
        _delegate: Option<&ConceptDescription>,
    ) -> Option<ResourceDescription> {
        match rep {
            Representation::Default | Representation::Full => {
                let mut description = ResourceDescription::new();
                description
                    .add_property("uuid")
                    .add_property("display")
                    .add_property("description")
                    .add_property("locale");
                Some(description)
            }
            _ => None,
        }
    }

    fn creatable_properties(&self) -> RestResult<FieldSet> {
        let mut fields = FieldSet::new();
        fields.add_required("description").add_required("locale");
        Ok(fields)
    }
}
