//! Capability traits and the generic conversion engine.
//!
//! Resources are composed from small traits rather than a class hierarchy:
//! - [`Representable`]: descriptions, accessors and identity of one delegate type.
//! - [`CrudHandler`]: fetch/create/update/delete/purge/list/search delegation to a domain
//!   service. Every capability defaults to [`RestError::OperationNotSupported`].
//! - [`SubResourceHandler`]: children owned by a parent delegate and addressed through the
//!   parent's URI.
//!
//! The object-safe traits [`Converter`], [`Resource`] and [`SubResource`] erase the delegate type
//! so the registry and router can hold every resource behind one interface. They are implemented
//! for every handler by blanket impls over the generic engine functions below.

use crate::accessors::{Getter, PropertyValue, Setter};
use crate::constants::{
    DEFAULT_VOID_REASON, PARAM_START_INDEX, PROPERTY_AUDIT_INFO, PROPERTY_DISPLAY,
    PROPERTY_LINKS, PROPERTY_RESOURCE_VERSION, PROPERTY_RETIRED, PROPERTY_UUID, PROPERTY_VOIDED,
    IGNORED_PROPERTIES, RESOURCE_VERSION_1_8,
};
use crate::context::RequestContext;
use crate::convert;
use crate::delegate::{Delegate, DelegateType};
use crate::description::{FieldSet, ResourceDescription};
use crate::paging::PageableResult;
use crate::representation::Representation;
use crate::schema::PropertyType;
use crate::{PropertyAccessors, RestError, RestResult};
use api_shared::{Link, SearchResult};
use emr_domain::AuditInfo;
use serde_json::{json, Map, Value};

// ===== CAPABILITY TRAITS =====

/// Soft-delete state of a delegate, as far as rendering and undelete are concerned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lifecycle {
    Voidable { voided: bool },
    Retireable { retired: bool },
    Permanent,
}

impl Lifecycle {
    pub fn is_deleted(self) -> bool {
        matches!(
            self,
            Lifecycle::Voidable { voided: true } | Lifecycle::Retireable { retired: true }
        )
    }

    /// The payload flag that undeletes the delegate when posted as `false`.
    pub fn flag(self) -> Option<&'static str> {
        match self {
            Lifecycle::Voidable { .. } => Some(PROPERTY_VOIDED),
            Lifecycle::Retireable { .. } => Some(PROPERTY_RETIRED),
            Lifecycle::Permanent => None,
        }
    }
}

pub(crate) fn not_supported(resource: &str, operation: &str) -> RestError {
    RestError::OperationNotSupported(format!("{operation} is not supported by {resource}"))
}

pub(crate) fn not_found(resource: &str, id: &str) -> RestError {
    RestError::ObjectNotFound(format!("{resource} {id}"))
}

/// Descriptions, accessors and identity of one delegate type.
pub trait Representable: Send + Sync + 'static {
    type Delegate: DelegateType;

    /// Resource name; also the tag nested delegates of this type are rendered under.
    fn name(&self) -> &'static str;

    fn resource_version(&self) -> &'static str {
        RESOURCE_VERSION_1_8
    }

    fn accessors(&self) -> &PropertyAccessors<Self::Delegate>;

    fn identifier<'a>(&self, delegate: &'a Self::Delegate) -> &'a str;

    fn lifecycle(&self, _delegate: &Self::Delegate) -> Lifecycle {
        Lifecycle::Permanent
    }

    fn audit<'a>(&self, _delegate: &'a Self::Delegate) -> Option<&'a AuditInfo> {
        None
    }

    /// The description for `rep`, or `None` if this resource does not handle it.
    ///
    /// `delegate` is given when rendering, so subtype-specific descriptions can be chosen; it is
    /// `None` when describing the resource in general (schema generation, CLI).
    fn representation_description(
        &self,
        rep: &Representation,
        delegate: Option<&Self::Delegate>,
    ) -> Option<ResourceDescription>;

    /// Renders a named representation that is not expressible as a description.
    fn render_named(
        &self,
        _name: &str,
        _delegate: &Self::Delegate,
        _ctx: &RequestContext,
    ) -> Option<RestResult<Value>> {
        None
    }

    fn uri(&self, delegate: &Self::Delegate, ctx: &RequestContext) -> String {
        format!(
            "{}/{}/{}",
            ctx.config().rest_root(),
            self.name(),
            self.identifier(delegate)
        )
    }

    /// Adds resource-specific keys (such as a subtype `type`) to a rendered object.
    fn decorate(&self, _delegate: &Self::Delegate, _out: &mut Map<String, Value>) {}

    fn getter(&self, name: &str, _delegate: &Self::Delegate) -> Option<Getter<Self::Delegate>> {
        self.accessors().getter(name)
    }

    fn setter(&self, name: &str, _delegate: &Self::Delegate) -> Option<Setter<Self::Delegate>> {
        self.accessors().setter(name)
    }

    fn creatable_properties(&self) -> RestResult<FieldSet> {
        Err(not_supported(self.name(), "create"))
    }

    /// Defaults to the creatable properties, all optional.
    fn updatable_properties(&self) -> RestResult<FieldSet> {
        self.creatable_properties().map(|f| f.all_optional())
    }

    fn property_type(&self, name: &str) -> PropertyType {
        PropertyType::common(name)
    }
}

/// CRUD delegation to the owning domain service.
pub trait CrudHandler: Representable {
    /// Looks up a delegate by id; resources with a name fallback retry by name on a miss.
    fn fetch(&self, id: &str, ctx: &RequestContext) -> RestResult<Option<Self::Delegate>>;

    /// A fresh delegate for a create payload, before any setter runs.
    fn new_delegate(
        &self,
        _body: &Map<String, Value>,
        _ctx: &RequestContext,
    ) -> RestResult<Self::Delegate> {
        Err(not_supported(self.name(), "create"))
    }

    fn save(&self, _delegate: Self::Delegate, _ctx: &RequestContext) -> RestResult<Self::Delegate> {
        Err(not_supported(self.name(), "save"))
    }

    /// Soft delete. Must succeed without touching the service if already deleted.
    fn delete_delegate(
        &self,
        _delegate: Self::Delegate,
        _reason: &str,
        _ctx: &RequestContext,
    ) -> RestResult<()> {
        Err(not_supported(self.name(), "delete"))
    }

    /// Reverses a soft delete on the in-memory delegate; the caller saves it.
    fn undelete_delegate(
        &self,
        _delegate: Self::Delegate,
        _ctx: &RequestContext,
    ) -> RestResult<Self::Delegate> {
        Err(not_supported(self.name(), "undelete"))
    }

    /// Hard delete. `None` means the delegate is already gone, which is not an error.
    fn purge_delegate(
        &self,
        _delegate: Option<Self::Delegate>,
        _ctx: &RequestContext,
    ) -> RestResult<()> {
        Err(not_supported(self.name(), "purge"))
    }

    fn list_all(&self, _ctx: &RequestContext) -> RestResult<PageableResult<Self::Delegate>> {
        Err(not_supported(self.name(), "list"))
    }

    fn search_delegates(
        &self,
        _ctx: &RequestContext,
    ) -> RestResult<PageableResult<Self::Delegate>> {
        Err(not_supported(self.name(), "search"))
    }
}

/// Children owned by a parent delegate.
///
/// The parent is always taken from the URL, never from the payload, so the parent-linking
/// property is never creatable.
pub trait SubResourceHandler: Representable {
    type Parent: Send + Sync + 'static;

    /// Resource name of the parent, e.g. `person`.
    fn parent_resource(&self) -> &'static str;

    /// Path segment under the parent, e.g. `name`.
    fn path(&self) -> &'static str;

    fn fetch_parent(&self, id: &str, ctx: &RequestContext) -> RestResult<Option<Self::Parent>>;

    fn children<'a>(&self, parent: &'a Self::Parent) -> &'a [Self::Delegate];

    fn children_mut<'a>(&self, parent: &'a mut Self::Parent) -> &'a mut Vec<Self::Delegate>;

    fn new_child(&self, parent: &Self::Parent) -> Self::Delegate;

    fn save_parent(&self, parent: Self::Parent, ctx: &RequestContext) -> RestResult<Self::Parent>;

    /// Soft deletes a child, returning `false` if it was already deleted.
    fn void_child(&self, child: &mut Self::Delegate, reason: &str) -> RestResult<bool>;

    /// Reverses [`SubResourceHandler::void_child`].
    fn unvoid_child(&self, _child: &mut Self::Delegate) -> RestResult<()> {
        Err(not_supported(self.name(), "undelete"))
    }

    /// Whether `purge` may remove a child outright.
    fn supports_purge(&self) -> bool {
        true
    }

    /// Hook run after a child is added or changed, before the parent is saved.
    fn after_change(&self, _parent: &mut Self::Parent, _child_id: &str) -> RestResult<()> {
        Ok(())
    }
}

// ===== CONVERSION ENGINE =====

/// Renders `delegate` under `rep`.
///
/// Resolution order: the handler's own description, then a handler-specific named renderer,
/// then the built-in ref description or a parsed custom description.
///
/// # Errors
///
/// Returns [`RestError::UnsupportedRepresentation`] if nothing handles `rep`, or whatever a
/// property getter or nested conversion fails with.
pub fn as_representation<H>(
    handler: &H,
    delegate: &H::Delegate,
    rep: &Representation,
    ctx: &RequestContext,
) -> RestResult<Value>
where
    H: Representable + ?Sized,
{
    tracing::debug!(resource = handler.name(), representation = %rep, "rendering delegate");

    if let Some(description) = handler.representation_description(rep, Some(delegate)) {
        let mut out = convert_delegate_to_representation(handler, delegate, &description, ctx)?;
        if !rep.is_ref() {
            out.insert(
                PROPERTY_RESOURCE_VERSION.into(),
                Value::from(handler.resource_version()),
            );
        }
        handler.decorate(delegate, &mut out);
        return Ok(Value::Object(out));
    }

    if let Representation::Named(name) = rep {
        if let Some(rendered) = handler.render_named(name, delegate, ctx) {
            return rendered;
        }
    }

    let description = match rep {
        Representation::Ref => ref_description(handler.lifecycle(delegate)),
        Representation::Custom(spec) => ResourceDescription::from_custom(spec)?,
        _ => {
            return Err(RestError::UnsupportedRepresentation {
                resource: handler.name().into(),
                representation: rep.to_string(),
            })
        }
    };
    let mut out = convert_delegate_to_representation(handler, delegate, &description, ctx)?;
    handler.decorate(delegate, &mut out);
    Ok(Value::Object(out))
}

/// The built-in ref description: `uuid`, `display`, the deletion flag when set, and a self link.
pub fn ref_description(lifecycle: Lifecycle) -> ResourceDescription {
    let mut description = ResourceDescription::new();
    description
        .add_property(PROPERTY_UUID)
        .add_property(PROPERTY_DISPLAY);
    match lifecycle {
        Lifecycle::Voidable { voided: true } => {
            description.add_property(PROPERTY_VOIDED);
        }
        Lifecycle::Retireable { retired: true } => {
            description.add_property(PROPERTY_RETIRED);
        }
        _ => {}
    }
    description.add_self_link();
    description
}

/// Converts every described property, then the links.
pub fn convert_delegate_to_representation<H>(
    handler: &H,
    delegate: &H::Delegate,
    description: &ResourceDescription,
    ctx: &RequestContext,
) -> RestResult<Map<String, Value>>
where
    H: Representable + ?Sized,
{
    let mut out = Map::new();
    for property in description.properties() {
        let value = get_property(handler, delegate, &property.source, ctx)?;
        let converted = convert_value(value, &property.nested_representation(), ctx)?;
        out.insert(property.name.clone(), converted);
    }

    if !description.links().is_empty() {
        let uri = handler.uri(delegate, ctx);
        let links: Vec<Value> = description
            .links()
            .iter()
            .map(|link| json!({ "rel": link.rel, "uri": link.resolve(&uri) }))
            .collect();
        out.insert(PROPERTY_LINKS.into(), Value::Array(links));
    }
    Ok(out)
}

/// Reads one property through the registered getter, falling back to the built-in properties.
pub fn get_property<H>(
    handler: &H,
    delegate: &H::Delegate,
    name: &str,
    ctx: &RequestContext,
) -> RestResult<PropertyValue>
where
    H: Representable + ?Sized,
{
    if let Some(getter) = handler.getter(name, delegate) {
        return getter(delegate, ctx);
    }
    match (name, handler.lifecycle(delegate)) {
        (PROPERTY_UUID, _) => Ok(PropertyValue::from(handler.identifier(delegate))),
        (PROPERTY_AUDIT_INFO, _) => Ok(handler
            .audit(delegate)
            .map_or(PropertyValue::Null, |a| PropertyValue::Json(audit_info(a)))),
        (PROPERTY_VOIDED, Lifecycle::Voidable { voided }) => Ok(voided.into()),
        (PROPERTY_RETIRED, Lifecycle::Retireable { retired }) => Ok(retired.into()),
        _ => Err(RestError::conversion(
            name,
            format!("{} has no property named '{name}'", handler.name()),
        )),
    }
}

fn audit_info(audit: &AuditInfo) -> Value {
    json!({
        "creator": audit.creator,
        "dateCreated": convert::format_datetime(&audit.date_created),
        "changedBy": audit.changed_by,
        "dateChanged": audit.date_changed.as_ref().map(convert::format_datetime),
    })
}

/// Converts a property value to JSON, rendering nested delegates under `rep`.
pub fn convert_value(
    value: PropertyValue,
    rep: &Representation,
    ctx: &RequestContext,
) -> RestResult<Value> {
    match value {
        PropertyValue::Null => Ok(Value::Null),
        PropertyValue::Json(v) => Ok(v),
        PropertyValue::List(items) => items
            .into_iter()
            .map(|item| convert_value(item, rep, ctx))
            .collect::<RestResult<Vec<_>>>()
            .map(Value::Array),
        PropertyValue::Delegate(delegate) => ctx.registry().render(&delegate, rep, ctx),
    }
}

/// Fails with the names of every required property absent from `body`.
pub fn check_required(allowed: &FieldSet, body: &Map<String, Value>) -> RestResult<()> {
    let missing: Vec<&str> = allowed
        .required()
        .filter(|name| !body.contains_key(*name))
        .collect();
    if missing.is_empty() {
        return Ok(());
    }
    let names = missing.join(", ");
    Err(RestError::conversion(
        names.clone(),
        format!("Some required properties are missing: {names}"),
    ))
}

/// Applies a payload to a delegate.
///
/// Echoed read-only properties (`display`, `links`, `auditInfo`, ...) are ignored. A property
/// outside `allowed` is accepted only if it equals the delegate's current value. Allowed
/// properties are written in declaration order.
pub fn set_converted_properties<H>(
    handler: &H,
    delegate: &mut H::Delegate,
    body: &Map<String, Value>,
    allowed: &FieldSet,
    ctx: &RequestContext,
) -> RestResult<()>
where
    H: Representable + ?Sized,
{
    let not_allowed: Vec<&str> = body
        .iter()
        .filter(|(key, _)| !IGNORED_PROPERTIES.contains(&key.as_str()) && !allowed.contains(key))
        .filter(|(key, value)| !is_unchanged(handler, delegate, key, value, ctx))
        .map(|(key, _)| key.as_str())
        .collect();
    if !not_allowed.is_empty() {
        let names = not_allowed.join(", ");
        return Err(RestError::conversion(
            names.clone(),
            format!("Some properties are not allowed to be set: {names}"),
        ));
    }

    for field in allowed.fields() {
        let Some(value) = body.get(&field.name) else {
            continue;
        };
        let setter = handler.setter(&field.name, delegate).ok_or_else(|| {
            RestError::conversion(
                field.name.clone(),
                format!("{} cannot set property '{}'", handler.name(), field.name),
            )
        })?;
        setter(delegate, value, ctx)?;
    }
    Ok(())
}

fn is_unchanged<H>(
    handler: &H,
    delegate: &H::Delegate,
    name: &str,
    posted: &Value,
    ctx: &RequestContext,
) -> bool
where
    H: Representable + ?Sized,
{
    get_property(handler, delegate, name, ctx)
        .and_then(|current| convert_value(current, &Representation::Ref, ctx))
        .map(|current| same_value(&current, posted))
        .unwrap_or(false)
}

/// Value equality where nested objects compare by uuid.
fn same_value(current: &Value, posted: &Value) -> bool {
    match (current, posted) {
        (Value::Object(c), Value::Object(p)) => match (c.get(PROPERTY_UUID), p.get(PROPERTY_UUID)) {
            (Some(a), Some(b)) => a == b,
            _ => c == p,
        },
        (Value::Object(c), Value::String(s)) => {
            c.get(PROPERTY_UUID).and_then(Value::as_str) == Some(s.as_str())
        }
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| same_value(x, y))
        }
        _ => current == posted,
    }
}

fn body_object(body: &Value) -> RestResult<&Map<String, Value>> {
    body.as_object()
        .ok_or_else(|| RestError::IllegalRequest("request body must be a JSON object".into()))
}

/// Renders one page of delegates as a search result with `next`/`prev` links.
pub fn to_search_result<H>(
    handler: &H,
    result: PageableResult<H::Delegate>,
    path: &str,
    ctx: &RequestContext,
) -> RestResult<SearchResult>
where
    H: Representable + ?Sized,
{
    let page = result.into_page(ctx);
    let rep = ctx.representation_or(Representation::Ref);
    let results = page
        .results
        .iter()
        .map(|delegate| as_representation(handler, delegate, &rep, ctx))
        .collect::<RestResult<Vec<_>>>()?;

    let start = ctx.params().start_index;
    let limit = ctx.limit();
    let mut links = Vec::new();
    if page.has_more {
        links.push(page_link(ctx, path, "next", start.saturating_add(limit)));
    }
    if start > 0 {
        links.push(page_link(ctx, path, "prev", start.saturating_sub(limit)));
    }

    Ok(SearchResult {
        results,
        links,
        total_count: page.total.filter(|_| ctx.params().total_count),
    })
}

fn page_link(ctx: &RequestContext, path: &str, rel: &str, start_index: usize) -> Link {
    let mut query = ctx.params().query.clone();
    query.insert(PARAM_START_INDEX.into(), start_index.to_string());
    let encoded = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(query.iter())
        .finish();
    Link {
        rel: rel.into(),
        uri: format!("{path}?{encoded}"),
    }
}

// ===== TYPE-ERASED INTERFACES =====

/// Renders and describes one delegate type without exposing it.
pub trait Converter: Send + Sync {
    fn resource_name(&self) -> &'static str;
    fn version(&self) -> &'static str;
    fn render(
        &self,
        delegate: &Delegate,
        rep: &Representation,
        ctx: &RequestContext,
    ) -> RestResult<Value>;
    /// The description for `rep`, with the built-in ref description standing in for `Ref`.
    fn describe(&self, rep: &Representation) -> Option<ResourceDescription>;
    fn creatable(&self) -> RestResult<FieldSet>;
    fn updatable(&self) -> RestResult<FieldSet>;
    fn type_of(&self, property: &str) -> PropertyType;
}

impl<H: Representable> Converter for H {
    fn resource_name(&self) -> &'static str {
        Representable::name(self)
    }

    fn version(&self) -> &'static str {
        self.resource_version()
    }

    fn render(
        &self,
        delegate: &Delegate,
        rep: &Representation,
        ctx: &RequestContext,
    ) -> RestResult<Value> {
        let typed = H::Delegate::from_delegate(delegate).ok_or_else(|| {
            RestError::conversion(
                delegate.tag(),
                format!("{} cannot render a {}", self.name(), delegate.tag()),
            )
        })?;
        as_representation(self, typed, rep, ctx)
    }

    fn describe(&self, rep: &Representation) -> Option<ResourceDescription> {
        self.representation_description(rep, None).or_else(|| {
            rep.is_ref()
                .then(|| ref_description(Lifecycle::Permanent))
        })
    }

    fn creatable(&self) -> RestResult<FieldSet> {
        self.creatable_properties()
    }

    fn updatable(&self) -> RestResult<FieldSet> {
        self.updatable_properties()
    }

    fn type_of(&self, property: &str) -> PropertyType {
        self.property_type(property)
    }
}

/// A top-level resource.
pub trait Resource: Converter {
    fn retrieve(&self, id: &str, ctx: &RequestContext) -> RestResult<Value>;
    fn create(&self, body: &Value, ctx: &RequestContext) -> RestResult<Value>;
    fn update(&self, id: &str, body: &Value, ctx: &RequestContext) -> RestResult<Value>;
    /// Voids/retires, or purges when the request carries `purge`.
    fn delete(&self, id: &str, ctx: &RequestContext) -> RestResult<()>;
    /// Lists everything, or searches when the request carries search parameters.
    fn list(&self, ctx: &RequestContext) -> RestResult<SearchResult>;
}

impl<H: CrudHandler> Resource for H {
    fn retrieve(&self, id: &str, ctx: &RequestContext) -> RestResult<Value> {
        let delegate = self
            .fetch(id, ctx)?
            .ok_or_else(|| not_found(self.name(), id))?;
        as_representation(
            self,
            &delegate,
            &ctx.representation_or(Representation::Default),
            ctx,
        )
    }

    fn create(&self, body: &Value, ctx: &RequestContext) -> RestResult<Value> {
        let body = body_object(body)?;
        let allowed = self.creatable_properties()?;
        check_required(&allowed, body)?;

        let mut delegate = self.new_delegate(body, ctx)?;
        set_converted_properties(self, &mut delegate, body, &allowed, ctx)?;
        let saved = self.save(delegate, ctx)?;
        tracing::info!("created {} {}", self.name(), self.identifier(&saved));

        as_representation(
            self,
            &saved,
            &ctx.representation_or(Representation::Default),
            ctx,
        )
    }

    fn update(&self, id: &str, body: &Value, ctx: &RequestContext) -> RestResult<Value> {
        let mut body = body_object(body)?.clone();
        let mut delegate = self
            .fetch(id, ctx)?
            .ok_or_else(|| not_found(self.name(), id))?;

        let lifecycle = self.lifecycle(&delegate);
        if let Some(flag) = lifecycle.flag() {
            if lifecycle.is_deleted() && body.get(flag) == Some(&Value::Bool(false)) {
                delegate = self.undelete_delegate(delegate, ctx)?;
                body.remove(flag);
                tracing::info!("undeleted {} {}", self.name(), id);
            }
        }

        let allowed = self.updatable_properties()?;
        set_converted_properties(self, &mut delegate, &body, &allowed, ctx)?;
        let saved = self.save(delegate, ctx)?;

        as_representation(
            self,
            &saved,
            &ctx.representation_or(Representation::Default),
            ctx,
        )
    }

    fn delete(&self, id: &str, ctx: &RequestContext) -> RestResult<()> {
        if ctx.params().purge {
            let delegate = self.fetch(id, ctx)?;
            self.purge_delegate(delegate, ctx)?;
            tracing::info!("purged {} {}", self.name(), id);
            return Ok(());
        }

        let delegate = self
            .fetch(id, ctx)?
            .ok_or_else(|| not_found(self.name(), id))?;
        let reason = ctx
            .params()
            .reason
            .as_deref()
            .unwrap_or(DEFAULT_VOID_REASON);
        self.delete_delegate(delegate, reason, ctx)?;
        tracing::info!("deleted {} {}", self.name(), id);
        Ok(())
    }

    fn list(&self, ctx: &RequestContext) -> RestResult<SearchResult> {
        let result = if ctx.params().is_search() {
            self.search_delegates(ctx)?
        } else {
            self.list_all(ctx)?
        };
        let path = format!("{}/{}", ctx.config().rest_root(), self.name());
        to_search_result(self, result, &path, ctx)
    }
}

/// A sub-resource addressed as `<parent>/<parent id>/<path>[/<id>]`.
pub trait SubResource: Converter {
    fn parent_name(&self) -> &'static str;
    fn sub_path(&self) -> &'static str;
    fn list(&self, parent_id: &str, ctx: &RequestContext) -> RestResult<SearchResult>;
    fn retrieve(&self, parent_id: &str, id: &str, ctx: &RequestContext) -> RestResult<Value>;
    fn create(&self, parent_id: &str, body: &Value, ctx: &RequestContext) -> RestResult<Value>;
    fn update(
        &self,
        parent_id: &str,
        id: &str,
        body: &Value,
        ctx: &RequestContext,
    ) -> RestResult<Value>;
    fn delete(&self, parent_id: &str, id: &str, ctx: &RequestContext) -> RestResult<()>;
}

fn parent_of<H: SubResourceHandler + ?Sized>(
    handler: &H,
    parent_id: &str,
    ctx: &RequestContext,
) -> RestResult<H::Parent> {
    handler
        .fetch_parent(parent_id, ctx)?
        .ok_or_else(|| not_found(handler.parent_resource(), parent_id))
}

fn child_position<H: SubResourceHandler + ?Sized>(
    handler: &H,
    parent: &H::Parent,
    id: &str,
) -> Option<usize> {
    handler
        .children(parent)
        .iter()
        .position(|c| handler.identifier(c) == id)
}

impl<H: SubResourceHandler> SubResource for H {
    fn parent_name(&self) -> &'static str {
        self.parent_resource()
    }

    fn sub_path(&self) -> &'static str {
        self.path()
    }

    fn list(&self, parent_id: &str, ctx: &RequestContext) -> RestResult<SearchResult> {
        let parent = parent_of(self, parent_id, ctx)?;
        let children: Vec<H::Delegate> = self
            .children(&parent)
            .iter()
            .filter(|c| ctx.include_all() || !self.lifecycle(c).is_deleted())
            .cloned()
            .collect();
        let path = format!(
            "{}/{}/{}/{}",
            ctx.config().rest_root(),
            self.parent_resource(),
            parent_id,
            self.path()
        );
        to_search_result(self, PageableResult::NeedsPaging(children), &path, ctx)
    }

    fn retrieve(&self, parent_id: &str, id: &str, ctx: &RequestContext) -> RestResult<Value> {
        let parent = parent_of(self, parent_id, ctx)?;
        let position =
            child_position(self, &parent, id).ok_or_else(|| not_found(self.name(), id))?;
        as_representation(
            self,
            &self.children(&parent)[position],
            &ctx.representation_or(Representation::Default),
            ctx,
        )
    }

    fn create(&self, parent_id: &str, body: &Value, ctx: &RequestContext) -> RestResult<Value> {
        let body = body_object(body)?;
        let allowed = self.creatable_properties()?;
        check_required(&allowed, body)?;

        let mut parent = parent_of(self, parent_id, ctx)?;
        let mut child = self.new_child(&parent);
        set_converted_properties(self, &mut child, body, &allowed, ctx)?;
        let child_id = self.identifier(&child).to_owned();
        self.children_mut(&mut parent).push(child);
        self.after_change(&mut parent, &child_id)?;

        let saved = self.save_parent(parent, ctx)?;
        tracing::info!(
            "created {} {} under {} {}",
            self.name(),
            child_id,
            self.parent_resource(),
            parent_id
        );
        self.retrieve_from(&saved, &child_id, ctx)
    }

    fn update(
        &self,
        parent_id: &str,
        id: &str,
        body: &Value,
        ctx: &RequestContext,
    ) -> RestResult<Value> {
        let mut body = body_object(body)?.clone();
        let mut parent = parent_of(self, parent_id, ctx)?;
        let position =
            child_position(self, &parent, id).ok_or_else(|| not_found(self.name(), id))?;

        let mut child = self.children(&parent)[position].clone();
        let lifecycle = self.lifecycle(&child);
        if let Some(flag) = lifecycle.flag() {
            if lifecycle.is_deleted() && body.get(flag) == Some(&Value::Bool(false)) {
                body.remove(flag);
                self.unvoid_child(&mut child)?;
            }
        }
        let allowed = self.updatable_properties()?;
        set_converted_properties(self, &mut child, &body, &allowed, ctx)?;
        self.children_mut(&mut parent)[position] = child;
        self.after_change(&mut parent, id)?;

        let saved = self.save_parent(parent, ctx)?;
        self.retrieve_from(&saved, id, ctx)
    }

    fn delete(&self, parent_id: &str, id: &str, ctx: &RequestContext) -> RestResult<()> {
        let mut parent = parent_of(self, parent_id, ctx)?;
        let position = child_position(self, &parent, id);

        if ctx.params().purge {
            if !self.supports_purge() {
                return Err(not_supported(self.name(), "purge"));
            }
            // An already removed child counts as purged.
            if let Some(position) = position {
                self.children_mut(&mut parent).remove(position);
                self.save_parent(parent, ctx)?;
                tracing::info!("purged {} {}", self.name(), id);
            }
            return Ok(());
        }

        let position = position.ok_or_else(|| not_found(self.name(), id))?;
        let reason = ctx
            .params()
            .reason
            .as_deref()
            .unwrap_or(DEFAULT_VOID_REASON);
        if self.void_child(&mut self.children_mut(&mut parent)[position], reason)? {
            self.save_parent(parent, ctx)?;
            tracing::info!("deleted {} {}", self.name(), id);
        }
        Ok(())
    }
}

trait RetrieveFrom: SubResourceHandler {
    fn retrieve_from(
        &self,
        parent: &Self::Parent,
        id: &str,
        ctx: &RequestContext,
    ) -> RestResult<Value> {
        let position =
            child_position(self, parent, id).ok_or_else(|| not_found(self.name(), id))?;
        as_representation(
            self,
            &self.children(parent)[position],
            &ctx.representation_or(Representation::Default),
            ctx,
        )
    }
}

impl<H: SubResourceHandler> RetrieveFrom for H {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::conceptdatatype::ConceptDatatypeResource;
    use crate::resources::location::LocationResource;
    use crate::resources::person::PersonNameResource;
    use crate::resources::testing::{Fixture, PERSON, XANADU};
    use serde_json::json;

    #[test]
    fn test_ref_shows_retired_only_when_set() {
        let fixture = Fixture::new();
        let resource = LocationResource::new();
        let rendered = resource
            .retrieve(XANADU, &fixture.ctx(&[("v", "ref")]))
            .expect("location renders");
        let keys: Vec<&str> = rendered
            .as_object()
            .expect("object")
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(keys, vec!["uuid", "display", "links"]);

        resource
            .delete(XANADU, &fixture.ctx(&[("reason", "moved")]))
            .expect("location retires");
        let rendered = resource
            .retrieve(XANADU, &fixture.ctx(&[("v", "ref")]))
            .expect("retired location renders");
        assert_eq!(rendered["retired"], true);
        assert!(rendered.get("resourceVersion").is_none(), "ref has no version");
    }

    #[test]
    fn test_unknown_named_representation() {
        let fixture = Fixture::new();
        let err = LocationResource::new()
            .retrieve(XANADU, &fixture.ctx(&[("v", "fullchildren")]))
            .expect_err("locations have no fullchildren view");
        assert!(matches!(err, RestError::UnsupportedRepresentation { .. }));
    }

    #[test]
    fn test_required_properties_checked_first() {
        let fixture = Fixture::new();
        let err = LocationResource::new()
            .create(&json!({ "description": "nameless" }), &fixture.ctx(&[]))
            .expect_err("name is required");
        assert_eq!(err.to_string(), "Some required properties are missing: name");
    }

    #[test]
    fn test_read_only_properties_pass_when_unchanged() {
        let fixture = Fixture::new();
        let resource = LocationResource::new();
        let updated = resource
            .update(
                XANADU,
                &json!({
                    "display": "ignored",
                    "childLocations": [],
                    "description": "Summer capital"
                }),
                &fixture.ctx(&[]),
            )
            .expect("echoed values are accepted");
        assert_eq!(updated["display"], "Xanadu");
        assert_eq!(updated["description"], "Summer capital");

        let err = resource
            .update(
                XANADU,
                &json!({ "childLocations": [{ "uuid": "dc5c1fcc-0459-4201-bf70-0b90535ba362" }] }),
                &fixture.ctx(&[]),
            )
            .expect_err("child locations cannot be posted");
        assert!(matches!(err, RestError::Conversion { .. }), "got {err}");
    }

    #[test]
    fn test_update_with_retired_false_unretires() {
        let fixture = Fixture::new();
        let resource = LocationResource::new();
        resource
            .delete(XANADU, &fixture.ctx(&[]))
            .expect("location retires");

        let updated = resource
            .update(XANADU, &json!({ "retired": false }), &fixture.ctx(&[]))
            .expect("location unretires");
        assert_eq!(updated["retired"], false);
    }

    #[test]
    fn test_search_result_links() {
        let fixture = Fixture::new();
        let page = ConceptDatatypeResource::new()
            .list(&fixture.ctx(&[("limit", "4"), ("startIndex", "4")]))
            .expect("datatypes list");
        assert_eq!(page.results.len(), 4);
        let rels: Vec<&str> = page.links.iter().map(|l| l.rel.as_str()).collect();
        assert_eq!(rels, vec!["next", "prev"]);
        assert!(
            page.links[0].uri.contains("startIndex=8"),
            "next link: {}",
            page.links[0].uri
        );
        assert!(page.total_count.is_none(), "totalCount not requested");
    }

    #[test]
    fn test_sub_resource_create_and_update_render_the_child() {
        let fixture = Fixture::new();
        let ctx = fixture.ctx(&[]);
        let names = PersonNameResource::new();

        let created = SubResource::create(
            &names,
            PERSON,
            &json!({ "givenName": "Colette", "familyName": "Chebaskwony" }),
            &ctx,
        )
        .expect("name is added");
        let id = created["uuid"].as_str().expect("new name has a uuid").to_owned();

        let updated = SubResource::update(&names, PERSON, &id, &json!({ "givenName": "Coletta" }), &ctx)
            .expect("name is updated");
        assert_eq!(updated["uuid"], json!(id));
        assert_eq!(updated["givenName"], "Coletta");

        let err = SubResource::retrieve(&names, PERSON, "no-such-name", &ctx)
            .expect_err("unknown child");
        assert_eq!(err.code(), "object_not_found");
    }
}
