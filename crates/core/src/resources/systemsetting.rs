//! `systemsetting`: global properties, addressed by uuid or by property name.

use crate::accessors::PropertyAccessors;
use crate::constants::RESOURCE_VERSION_1_9;
use crate::context::RequestContext;
use crate::convert;
use crate::description::{FieldSet, ResourceDescription};
use crate::paging::PageableResult;
use crate::representation::Representation;
use crate::resource::{CrudHandler, Representable};
use crate::{RestError, RestResult};
use emr_domain::{AuditInfo, GlobalProperty};
use serde_json::{Map, Value};

/// Section shown for properties without a dotted prefix.
const GENERAL_SECTION: &str = "General Settings";

/// `"<Section> - <Name> = <value>"`, e.g. `Order - Next Order Number Seed = 1`.
pub fn display_string(gp: &GlobalProperty) -> String {
    let (section, name) = match gp.property.find('.') {
        Some(end) if end > 0 => (beautify(&gp.property[..end]), &gp.property[end + 1..]),
        _ => (GENERAL_SECTION.to_owned(), gp.property.as_str()),
    };
    format!(
        "{section} - {} = {}",
        beautify(name),
        gp.value.as_deref().unwrap_or_default()
    )
}

/// Splits on `_`, `.`, whitespace and camel-case boundaries, then capitalises each word.
fn beautify(raw: &str) -> String {
    let spaced = raw.replace(['_', '.'], " ");
    spaced
        .split_whitespace()
        .flat_map(split_camel_case)
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum CharKind {
    Lower,
    Upper,
    Digit,
    Other,
}

fn kind_of(c: char) -> CharKind {
    if c.is_lowercase() {
        CharKind::Lower
    } else if c.is_uppercase() {
        CharKind::Upper
    } else if c.is_ascii_digit() {
        CharKind::Digit
    } else {
        CharKind::Other
    }
}

/// `nextOrderNumberSeed` -> `next`, `Order`, `Number`, `Seed`; `HTMLParser` -> `HTML`, `Parser`.
fn split_camel_case(word: &str) -> Vec<String> {
    let chars: Vec<char> = word.chars().collect();
    let mut parts = Vec::new();
    let mut current = String::new();
    for (i, &c) in chars.iter().enumerate() {
        if let Some(&prev) = i.checked_sub(1).and_then(|p| chars.get(p)) {
            let (prev_kind, kind) = (kind_of(prev), kind_of(c));
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            let boundary = match (prev_kind, kind) {
                (CharKind::Upper, CharKind::Upper) => next_is_lower,
                (CharKind::Upper, CharKind::Lower) => false,
                (a, b) => a != b,
            };
            if boundary && !current.is_empty() {
                parts.push(std::mem::take(&mut current));
            }
        }
        current.push(c);
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

pub struct SystemSettingResource {
    accessors: PropertyAccessors<GlobalProperty>,
}

impl Default for SystemSettingResource {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemSettingResource {
    pub fn new() -> Self {
        let accessors = PropertyAccessors::<GlobalProperty>::new()
            .get("display", |gp, _| Ok(display_string(gp).into()))
            .property(
                "property",
                |gp, _| Ok(gp.property.as_str().into()),
                |gp, v, _| {
                    let property = convert::string("property", v)?;
                    if property.trim().is_empty() {
                        return Err(RestError::conversion("property", "property cannot be blank"));
                    }
                    gp.property = property.trim().to_owned();
                    Ok(())
                },
            );
        let accessors = optional_text!(
            accessors,
            "value" => value,
            "description" => description,
        );
        Self { accessors }
    }
}

impl Representable for SystemSettingResource {
    type Delegate = GlobalProperty;

    fn name(&self) -> &'static str {
        "systemsetting"
    }

    fn resource_version(&self) -> &'static str {
        RESOURCE_VERSION_1_9
    }

    fn accessors(&self) -> &PropertyAccessors<GlobalProperty> {
        &self.accessors
    }

    fn identifier<'a>(&self, delegate: &'a GlobalProperty) -> &'a str {
        delegate.uuid.as_str()
    }

    fn audit<'a>(&self, delegate: &'a GlobalProperty) -> Option<&'a AuditInfo> {
        Some(&delegate.audit)
    }

    fn representation_description(
        &self,
        rep: &Representation,
        _delegate: Option<&GlobalProperty>,
    ) -> Option<ResourceDescription> {
        let mut description = ResourceDescription::new();
        match rep {
            Representation::Default | Representation::Full => {
                description
                    .add_property("uuid")
                    .add_property("property")
                    .add_property("value")
                    .add_property("description")
                    .add_property("display");
                if matches!(rep, Representation::Full) {
                    description.add_property("auditInfo");
                }
                description.add_self_link();
                if matches!(rep, Representation::Default) {
                    description.add_link("full", ".?v=full");
                }
            }
            _ => return None,
        }
        Some(description)
    }

    fn creatable_properties(&self) -> RestResult<FieldSet> {
        let mut fields = FieldSet::new();
        fields
            .add_required("property")
            .add("description")
            .add("value");
        Ok(fields)
    }

    fn updatable_properties(&self) -> RestResult<FieldSet> {
        let mut fields = self.creatable_properties()?.all_optional();
        fields.remove("property");
        Ok(fields)
    }
}

impl CrudHandler for SystemSettingResource {
    /// By uuid first; anything else is taken as a property name.
    fn fetch(&self, id: &str, ctx: &RequestContext) -> RestResult<Option<GlobalProperty>> {
        let administration = &ctx.services().administration;
        match administration.get_global_property_by_uuid(id)? {
            Some(found) => Ok(Some(found)),
            None => Ok(administration.get_global_property(id)?),
        }
    }

    fn new_delegate(
        &self,
        _body: &Map<String, Value>,
        _ctx: &RequestContext,
    ) -> RestResult<GlobalProperty> {
        Ok(GlobalProperty::default())
    }

    fn save(&self, delegate: GlobalProperty, ctx: &RequestContext) -> RestResult<GlobalProperty> {
        Ok(ctx.services().administration.save_global_property(delegate)?)
    }

    /// Settings have no void state; a delete removes them.
    fn delete_delegate(
        &self,
        delegate: GlobalProperty,
        _reason: &str,
        ctx: &RequestContext,
    ) -> RestResult<()> {
        self.purge_delegate(Some(delegate), ctx)
    }

    fn purge_delegate(&self, delegate: Option<GlobalProperty>, ctx: &RequestContext) -> RestResult<()> {
        if let Some(gp) = delegate {
            ctx.services()
                .administration
                .purge_global_property(&gp.property)?;
        }
        Ok(())
    }

    fn list_all(&self, ctx: &RequestContext) -> RestResult<PageableResult<GlobalProperty>> {
        Ok(ctx
            .services()
            .administration
            .get_all_global_properties()?
            .into())
    }

    fn search_delegates(&self, ctx: &RequestContext) -> RestResult<PageableResult<GlobalProperty>> {
        let prefix = super::query_text(ctx);
        Ok(ctx
            .services()
            .administration
            .get_global_properties_by_prefix(&prefix)?
            .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::Resource;
    use crate::resources::testing::Fixture;
    use serde_json::json;

    #[test]
    fn test_display_beautifies_segments() {
        let gp = GlobalProperty::new("order.nextOrderNumberSeed", Some("1".into()));
        assert_eq!(display_string(&gp), "Order - Next Order Number Seed = 1");

        let gp = GlobalProperty::new("locale_allowed.list", Some("en".into()));
        assert_eq!(display_string(&gp), "Locale Allowed - List = en");

        let gp = GlobalProperty::new("HTMLParserMode", None);
        assert_eq!(display_string(&gp), "General Settings - HTML Parser Mode = ");
    }

    #[test]
    fn test_fetch_by_property_name() {
        let fixture = Fixture::new();
        let setting = SystemSettingResource::new()
            .retrieve("concept.true", &fixture.ctx(&[]))
            .expect("found by name");
        assert_eq!(setting["property"], "concept.true");
        assert_eq!(setting["value"], "3cd6f600-26fe-102b-80cb-0017a47871b2");
        assert_eq!(setting["resourceVersion"], "1.9");

        let uuid = setting["uuid"].as_str().expect("uuid is a string");
        let again = SystemSettingResource::new()
            .retrieve(uuid, &fixture.ctx(&[]))
            .expect("found by uuid");
        assert_eq!(again["property"], "concept.true");
    }

    #[test]
    fn test_create_update_delete() {
        let fixture = Fixture::new();
        let resource = SystemSettingResource::new();
        let ctx = fixture.ctx(&[]);
        let created = resource
            .create(
                &json!({ "property": "locale.allowed.list", "value": "en" }),
                &ctx,
            )
            .expect("setting is created");
        assert_eq!(created["display"], "Locale - Allowed List = en");

        let updated = resource
            .update(
                "locale.allowed.list",
                &json!({ "value": "en, fr", "description": "Locales" }),
                &ctx,
            )
            .expect("setting is updated");
        assert_eq!(updated["value"], "en, fr");
        assert_eq!(updated["description"], "Locales");

        let err = resource
            .update("locale.allowed.list", &json!({ "property": "renamed" }), &ctx)
            .expect_err("property is not updatable");
        assert_eq!(err.code(), "conversion");

        resource
            .delete("locale.allowed.list", &ctx)
            .expect("delete removes the setting");
        let err = resource
            .retrieve("locale.allowed.list", &ctx)
            .expect_err("setting is gone");
        assert_eq!(err.code(), "object_not_found");
    }

    #[test]
    fn test_property_is_required() {
        let fixture = Fixture::new();
        let err = SystemSettingResource::new()
            .create(&json!({ "value": "x" }), &fixture.ctx(&[]))
            .expect_err("property is required");
        assert_eq!(err.to_string(), "Some required properties are missing: property");
    }

    #[test]
    fn test_prefix_search() {
        let fixture = Fixture::new();
        let resource = SystemSettingResource::new();
        let all = resource.list(&fixture.ctx(&[])).expect("list succeeds");
        assert_eq!(all.results.len(), 3);

        let concepts = resource
            .list(&fixture.ctx(&[("q", "CONCEPT.")]))
            .expect("search succeeds");
        assert_eq!(concepts.results.len(), 2);
    }
}
