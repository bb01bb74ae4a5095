//! `order`: orders and their subtypes. Subtypes plug in as [`SubclassHandler`]s; drug orders
//! ship by default.

use super::{concept_id, linked, metadata_id, patient_id, person_id};
use crate::accessors::{Getter, PropertyAccessors, PropertyValue, Setter};
use crate::constants::{PARAM_PATIENT, PROPERTY_TYPE};
use crate::context::RequestContext;
use crate::convert;
use crate::description::{FieldSet, ResourceDescription};
use crate::paging::PageableResult;
use crate::representation::Representation;
use crate::resource::{not_supported, CrudHandler, Lifecycle, Representable};
use crate::schema::PropertyType;
use crate::subclass::{SubclassHandler, TypeHandlers};
use crate::{RestError, RestResult};
use emr_domain::{AuditInfo, DrugOrderDetail, MetadataKind, Order, OrderDetail};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Type tag of an order without a subtype.
pub const GENERIC_ORDER_TYPE: &str = "order";

macro_rules! optional_datetime {
    ($accessors:expr, $($name:literal => $field:ident),+ $(,)?) => {
        $accessors$(.property(
            $name,
            |o, _| Ok(PropertyValue::datetime(o.$field)),
            |o, v, _| {
                o.$field = convert::optional_datetime($name, v)?;
                Ok(())
            },
        ))+
    };
}

pub struct OrderResource {
    accessors: PropertyAccessors<Order>,
    handlers: TypeHandlers<Order>,
}

impl Default for OrderResource {
    fn default() -> Self {
        Self::new()
    }
}

impl OrderResource {
    pub fn new() -> Self {
        let accessors = PropertyAccessors::<Order>::new()
            .get("display", |o, ctx| {
                let concept = match &o.concept {
                    Some(id) => ctx.services().concepts.get_concept(id.as_str())?,
                    None => None,
                };
                Ok(concept
                    .map_or_else(|| "[No Concept]".to_owned(), |c| c.display_name())
                    .into())
            })
            // Consumed when the delegate is created.
            .set(PROPERTY_TYPE, |_, _, _| Ok(()))
            .property(
                "orderType",
                |o, ctx| {
                    linked(o.order_type.as_ref(), |id| {
                        ctx.services().metadata.get_metadata(MetadataKind::OrderType, id)
                    })
                },
                |o, v, ctx| {
                    o.order_type = metadata_id(MetadataKind::OrderType, "orderType", v, ctx)?;
                    if o.order_type.is_none() {
                        return Err(RestError::conversion("orderType", "orderType cannot be null"));
                    }
                    Ok(())
                },
            )
            .property(
                "patient",
                |o, ctx| linked(o.patient.as_ref(), |id| ctx.services().patients.get_patient(id)),
                |o, v, ctx| {
                    o.patient = patient_id("patient", v, ctx)?;
                    if o.patient.is_none() {
                        return Err(RestError::conversion("patient", "patient cannot be null"));
                    }
                    Ok(())
                },
            )
            .property(
                "concept",
                |o, ctx| linked(o.concept.as_ref(), |id| ctx.services().concepts.get_concept(id)),
                |o, v, ctx| {
                    o.concept = concept_id("concept", v, ctx)?;
                    Ok(())
                },
            )
            .property(
                "encounter",
                |o, ctx| {
                    linked(o.encounter.as_ref(), |id| {
                        ctx.services().encounters.get_encounter(id)
                    })
                },
                |o, v, ctx| {
                    o.encounter = super::resolve("encounter", v, |id| {
                        ctx.services().encounters.get_encounter(id)
                    })?
                    .map(|e| e.uuid);
                    Ok(())
                },
            )
            .property(
                "orderer",
                |o, ctx| linked(o.orderer.as_ref(), |id| ctx.services().persons.get_person(id)),
                |o, v, ctx| {
                    o.orderer = person_id("orderer", v, ctx)?;
                    Ok(())
                },
            )
            .property(
                "discontinued",
                |o, _| Ok(o.discontinued.into()),
                |o, v, _| {
                    o.discontinued = convert::parse_boolean("discontinued", v)?;
                    Ok(())
                },
            )
            .property(
                "discontinuedReason",
                |o, ctx| {
                    linked(o.discontinued_reason.as_ref(), |id| {
                        ctx.services().concepts.get_concept(id)
                    })
                },
                |o, v, ctx| {
                    o.discontinued_reason = concept_id("discontinuedReason", v, ctx)?;
                    Ok(())
                },
            );
        let accessors = optional_datetime!(
            accessors,
            "startDate" => start_date,
            "autoExpireDate" => auto_expire_date,
            "discontinuedDate" => discontinued_date,
        );
        let accessors = optional_text!(
            accessors,
            "instructions" => instructions,
            "accessionNumber" => accession_number,
            "discontinuedBy" => discontinued_by,
            "discontinuedReasonNonCoded" => discontinued_reason_non_coded,
        );

        let mut handlers = TypeHandlers::new();
        handlers.register(Arc::new(DrugOrderHandler::new()));
        Self {
            accessors,
            handlers,
        }
    }

    /// Registers another order subtype. A tag that is already taken keeps its first handler.
    pub fn with_handler(mut self, handler: Arc<dyn SubclassHandler<Order>>) -> Self {
        self.handlers.register(handler);
        self
    }

    pub fn handlers(&self) -> &TypeHandlers<Order> {
        &self.handlers
    }

    fn type_of_delegate(&self, order: &Order) -> &'static str {
        self.handlers
            .for_delegate(order)
            .map_or(GENERIC_ORDER_TYPE, |h| h.type_name())
    }

    fn base_description(rep: &Representation) -> Option<ResourceDescription> {
        let (nested, full) = match rep {
            Representation::Default => (Representation::Ref, false),
            Representation::Full => (Representation::Default, true),
            _ => return None,
        };
        let mut description = ResourceDescription::new();
        description
            .add_property("uuid")
            .add_property("display")
            .add_property_as("orderType", nested.clone())
            .add_property_as("patient", nested.clone())
            .add_property_as("concept", nested.clone())
            .add_property("instructions")
            .add_property("startDate")
            .add_property("autoExpireDate")
            .add_property_as("encounter", nested.clone())
            .add_property_as("orderer", nested.clone())
            .add_property("accessionNumber")
            .add_property("discontinued")
            .add_property("discontinuedBy")
            .add_property("discontinuedDate")
            .add_property_as("discontinuedReason", nested)
            .add_property("discontinuedReasonNonCoded")
            .add_property("voided");
        if full {
            description.add_property("auditInfo");
        }
        description.add_self_link();
        if !full {
            description.add_link("full", ".?v=full");
        }
        Some(description)
    }

    /// Keeps the orders of the subtype named by `t`, if given.
    fn filter_by_type(&self, orders: Vec<Order>, ctx: &RequestContext) -> RestResult<Vec<Order>> {
        let Some(wanted) = ctx.params().subclass.as_deref() else {
            return Ok(orders);
        };
        if wanted == GENERIC_ORDER_TYPE {
            return Ok(orders);
        }
        let handler = self
            .handlers
            .for_type(wanted)
            .ok_or_else(|| RestError::IllegalRequest(format!("unknown order type {wanted}")))?;
        Ok(orders.into_iter().filter(|o| handler.matches(o)).collect())
    }
}

impl Representable for OrderResource {
    type Delegate = Order;

    fn name(&self) -> &'static str {
        "order"
    }

    fn accessors(&self) -> &PropertyAccessors<Order> {
        &self.accessors
    }

    fn identifier<'a>(&self, delegate: &'a Order) -> &'a str {
        delegate.uuid.as_str()
    }

    fn lifecycle(&self, delegate: &Order) -> Lifecycle {
        Lifecycle::Voidable {
            voided: delegate.void.voided,
        }
    }

    fn audit<'a>(&self, delegate: &'a Order) -> Option<&'a AuditInfo> {
        Some(&delegate.audit)
    }

    /// The base description, followed by the subtype's own properties when rendering one.
    fn representation_description(
        &self,
        rep: &Representation,
        delegate: Option<&Order>,
    ) -> Option<ResourceDescription> {
        let mut description = Self::base_description(rep)?;
        let extra = delegate
            .and_then(|d| self.handlers.for_delegate(d))
            .and_then(|h| h.representation_description(rep));
        if let Some(extra) = extra {
            for property in extra.properties() {
                description.add_property_from(
                    &property.name,
                    &property.source,
                    property.nested.clone(),
                );
            }
        }
        Some(description)
    }

    fn decorate(&self, delegate: &Order, out: &mut Map<String, Value>) {
        out.insert(
            PROPERTY_TYPE.into(),
            Value::from(self.type_of_delegate(delegate)),
        );
    }

    fn getter(&self, name: &str, delegate: &Order) -> Option<Getter<Order>> {
        self.handlers
            .for_delegate(delegate)
            .and_then(|h| h.accessors().getter(name))
            .or_else(|| self.accessors.getter(name))
    }

    fn setter(&self, name: &str, delegate: &Order) -> Option<Setter<Order>> {
        self.handlers
            .for_delegate(delegate)
            .and_then(|h| h.accessors().setter(name))
            .or_else(|| self.accessors.setter(name))
    }

    /// Every subtype's properties are accepted; setting one on another subtype fails.
    fn creatable_properties(&self) -> RestResult<FieldSet> {
        let mut fields = FieldSet::new();
        fields
            .add_required(PROPERTY_TYPE)
            .add_required("orderType")
            .add_required("patient")
            .add_required("concept")
            .add("instructions")
            .add("startDate")
            .add("autoExpireDate")
            .add("encounter")
            .add("orderer")
            .add("discontinued")
            .add("discontinuedBy")
            .add("discontinuedDate")
            .add("discontinuedReason")
            .add("discontinuedReasonNonCoded")
            .add("accessionNumber");
        for name in self.handlers.types() {
            if let Some(handler) = self.handlers.for_type(name) {
                for field in handler.creatable_properties().fields() {
                    fields.add(&field.name);
                }
            }
        }
        Ok(fields)
    }

    fn updatable_properties(&self) -> RestResult<FieldSet> {
        let mut fields = self.creatable_properties()?.all_optional();
        fields.remove(PROPERTY_TYPE);
        Ok(fields)
    }

    fn property_type(&self, name: &str) -> PropertyType {
        let from_handler = self
            .handlers
            .types()
            .filter_map(|t| self.handlers.for_type(t))
            .find_map(|h| h.property_type(name));
        if let Some(found) = from_handler {
            return found;
        }
        match name {
            "orderType" => PropertyType::Ref("ordertype"),
            "patient" => PropertyType::Ref("patient"),
            "concept" | "discontinuedReason" => PropertyType::Ref("concept"),
            "encounter" => PropertyType::Ref("encounter"),
            "orderer" => PropertyType::Ref("person"),
            "discontinued" => PropertyType::Boolean,
            "startDate" | "autoExpireDate" | "discontinuedDate" => PropertyType::DateTime,
            other => PropertyType::common(other),
        }
    }
}

impl CrudHandler for OrderResource {
    fn fetch(&self, id: &str, ctx: &RequestContext) -> RestResult<Option<Order>> {
        Ok(ctx.services().orders.get_order(id)?)
    }

    /// A blank order of the posted `type`.
    fn new_delegate(&self, body: &Map<String, Value>, _ctx: &RequestContext) -> RestResult<Order> {
        let Some(tag) = body.get(PROPERTY_TYPE).and_then(Value::as_str) else {
            return Err(RestError::conversion(PROPERTY_TYPE, "type must be a string"));
        };
        if tag.eq_ignore_ascii_case(GENERIC_ORDER_TYPE) {
            return Ok(Order::default());
        }
        self.handlers
            .for_type(tag)
            .map(|h| h.new_delegate())
            .ok_or_else(|| RestError::conversion(PROPERTY_TYPE, format!("unknown order type {tag}")))
    }

    fn save(&self, delegate: Order, ctx: &RequestContext) -> RestResult<Order> {
        Ok(ctx.services().orders.save_order(delegate)?)
    }

    fn delete_delegate(&self, mut delegate: Order, reason: &str, ctx: &RequestContext) -> RestResult<()> {
        if delegate.void.void(reason) {
            ctx.services().orders.save_order(delegate)?;
        }
        Ok(())
    }

    fn undelete_delegate(&self, mut delegate: Order, _ctx: &RequestContext) -> RestResult<Order> {
        delegate.void.unvoid();
        Ok(delegate)
    }

    fn purge_delegate(&self, delegate: Option<Order>, ctx: &RequestContext) -> RestResult<()> {
        if let Some(order) = delegate {
            ctx.services().orders.purge_order(order.uuid.as_str())?;
        }
        Ok(())
    }

    fn list_all(&self, ctx: &RequestContext) -> RestResult<PageableResult<Order>> {
        let orders = ctx.services().orders.get_all_orders(ctx.include_all())?;
        Ok(self.filter_by_type(orders, ctx)?.into())
    }

    fn search_delegates(&self, ctx: &RequestContext) -> RestResult<PageableResult<Order>> {
        let Some(patient) = ctx.param(PARAM_PATIENT) else {
            return Err(not_supported(self.name(), "search"));
        };
        let services = ctx.services();
        let Some(patient) = services.patients.get_patient(patient)? else {
            tracing::debug!("order search: no patient {patient}");
            return Ok(PageableResult::Empty);
        };
        let orders = services
            .orders
            .get_orders_by_patient(patient.uuid().as_str())?;
        Ok(self.filter_by_type(orders, ctx)?.into())
    }
}

// ===== DRUG ORDERS =====

pub struct DrugOrderHandler {
    accessors: PropertyAccessors<Order>,
}

impl Default for DrugOrderHandler {
    fn default() -> Self {
        Self::new()
    }
}

fn drug_detail(order: &Order) -> Option<&DrugOrderDetail> {
    match &order.detail {
        OrderDetail::Drug(detail) => Some(detail),
        OrderDetail::Generic => None,
    }
}

fn drug_detail_mut<'a>(order: &'a mut Order, property: &str) -> RestResult<&'a mut DrugOrderDetail> {
    match &mut order.detail {
        OrderDetail::Drug(detail) => Ok(detail),
        OrderDetail::Generic => Err(RestError::conversion(
            property,
            format!("{property} can only be set on a drug order"),
        )),
    }
}

impl DrugOrderHandler {
    pub fn new() -> Self {
        let accessors = PropertyAccessors::<Order>::new()
            .property(
                "drug",
                |o, ctx| {
                    linked(drug_detail(o).and_then(|d| d.drug.as_ref()), |id| {
                        ctx.services().concepts.get_drug(id)
                    })
                },
                |o, v, ctx| {
                    let drug = super::resolve("drug", v, |id| ctx.services().concepts.get_drug(id))?;
                    drug_detail_mut(o, "drug")?.drug = drug.map(|d| d.uuid);
                    Ok(())
                },
            )
            .property(
                "dose",
                |o, _| Ok(PropertyValue::number(drug_detail(o).and_then(|d| d.dose))),
                |o, v, _| {
                    drug_detail_mut(o, "dose")?.dose = convert::optional_number("dose", v)?;
                    Ok(())
                },
            )
            .property(
                "units",
                |o, _| Ok(drug_detail(o).and_then(|d| d.units.clone()).into()),
                |o, v, _| {
                    drug_detail_mut(o, "units")?.units = convert::optional_string("units", v)?;
                    Ok(())
                },
            )
            .property(
                "frequency",
                |o, _| Ok(drug_detail(o).and_then(|d| d.frequency.clone()).into()),
                |o, v, _| {
                    drug_detail_mut(o, "frequency")?.frequency =
                        convert::optional_string("frequency", v)?;
                    Ok(())
                },
            )
            .property(
                "prn",
                |o, _| Ok(drug_detail(o).is_some_and(|d| d.prn).into()),
                |o, v, _| {
                    drug_detail_mut(o, "prn")?.prn = convert::parse_boolean("prn", v)?;
                    Ok(())
                },
            )
            .property(
                "complex",
                |o, _| Ok(drug_detail(o).is_some_and(|d| d.complex).into()),
                |o, v, _| {
                    drug_detail_mut(o, "complex")?.complex = convert::parse_boolean("complex", v)?;
                    Ok(())
                },
            )
            .property(
                "quantity",
                |o, _| {
                    Ok(drug_detail(o)
                        .and_then(|d| d.quantity)
                        .map_or(PropertyValue::Null, |q| Value::from(q).into()))
                },
                |o, v, _| {
                    let quantity = match convert::optional_number("quantity", v)? {
                        Some(n) if n.fract() == 0.0 && n.abs() <= f64::from(i32::MAX) => {
                            Some(n as i32)
                        }
                        Some(n) => {
                            return Err(RestError::conversion(
                                "quantity",
                                format!("quantity must be a whole number, got {n}"),
                            ))
                        }
                        None => None,
                    };
                    drug_detail_mut(o, "quantity")?.quantity = quantity;
                    Ok(())
                },
            );
        Self { accessors }
    }
}

impl SubclassHandler<Order> for DrugOrderHandler {
    fn type_name(&self) -> &'static str {
        "drugorder"
    }

    fn matches(&self, delegate: &Order) -> bool {
        matches!(delegate.detail, OrderDetail::Drug(_))
    }

    fn new_delegate(&self) -> Order {
        Order {
            detail: OrderDetail::Drug(DrugOrderDetail::default()),
            ..Default::default()
        }
    }

    fn representation_description(&self, rep: &Representation) -> Option<ResourceDescription> {
        let nested = match rep {
            Representation::Default => Representation::Ref,
            Representation::Full => Representation::Default,
            _ => return None,
        };
        let mut description = ResourceDescription::new();
        description
            .add_property_as("drug", nested)
            .add_property("dose")
            .add_property("units")
            .add_property("frequency")
            .add_property("prn")
            .add_property("complex")
            .add_property("quantity");
        Some(description)
    }

    fn creatable_properties(&self) -> FieldSet {
        let mut fields = FieldSet::new();
        fields
            .add("drug")
            .add("dose")
            .add("units")
            .add("frequency")
            .add("prn")
            .add("complex")
            .add("quantity");
        fields
    }

    fn accessors(&self) -> &PropertyAccessors<Order> {
        &self.accessors
    }

    fn property_type(&self, name: &str) -> Option<PropertyType> {
        match name {
            "drug" => Some(PropertyType::Ref("drug")),
            "dose" => Some(PropertyType::Number),
            "quantity" => Some(PropertyType::Integer),
            "prn" | "complex" => Some(PropertyType::Boolean),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::Resource;
    use crate::resources::testing::{Fixture, ASPIRIN, ORDER, ORDER_TYPE, PATIENT, PERSON, RICE};
    use serde_json::json;

    fn drug_order_body() -> Value {
        json!({
            "type": "drugorder",
            "orderType": ORDER_TYPE,
            "patient": PATIENT,
            "concept": RICE,
            "drug": ASPIRIN,
            "dose": 500,
            "units": "mg",
            "quantity": 30,
        })
    }

    #[test]
    fn test_drug_order_renders_subtype_properties() {
        let fixture = Fixture::new();
        let order = OrderResource::new()
            .retrieve(ORDER, &fixture.ctx(&[]))
            .expect("order exists");

        assert_eq!(order["type"], "drugorder");
        assert_eq!(order["display"], "RICE");
        assert_eq!(order["instructions"], "Take with food");
        assert_eq!(order["drug"]["uuid"], ASPIRIN);
        assert_eq!(order["dose"], 325.0);
        assert_eq!(order["frequency"], "daily");
        assert_eq!(order["prn"], false);
        assert_eq!(order["orderType"]["uuid"], ORDER_TYPE);
        assert_eq!(order["resourceVersion"], "1.8");
    }

    #[test]
    fn test_display_without_concept() {
        let fixture = Fixture::new();
        let resource = OrderResource::new();
        let order = Order::default();
        let getter = resource
            .getter("display", &order)
            .expect("display getter exists");
        match getter(&order, &fixture.ctx(&[])).expect("display renders") {
            PropertyValue::Json(value) => assert_eq!(value, "[No Concept]"),
            other => panic!("Expected a JSON display, got {other:?}"),
        }
    }

    #[test]
    fn test_create_drug_order() {
        let fixture = Fixture::new();
        let created = OrderResource::new()
            .create(&drug_order_body(), &fixture.ctx(&[]))
            .expect("drug order is created");

        assert_eq!(created["type"], "drugorder");
        assert_eq!(created["dose"], 500.0);
        assert_eq!(created["quantity"], 30);
        assert_eq!(created["patient"]["uuid"], PATIENT);
    }

    #[test]
    fn test_create_requires_type() {
        let fixture = Fixture::new();
        let mut body = drug_order_body();
        body.as_object_mut().expect("object body").remove("type");
        let err = OrderResource::new()
            .create(&body, &fixture.ctx(&[]))
            .expect_err("type is required");
        assert_eq!(err.code(), "conversion");
        assert_eq!(err.to_string(), "Some required properties are missing: type");

        body["type"] = json!("labtest");
        let err = OrderResource::new()
            .create(&body, &fixture.ctx(&[]))
            .expect_err("unknown type");
        assert_eq!(err.code(), "conversion");
    }

    #[test]
    fn test_generic_order_rejects_drug_properties() {
        let fixture = Fixture::new();
        let mut body = drug_order_body();
        body["type"] = json!("order");
        let err = OrderResource::new()
            .create(&body, &fixture.ctx(&[]))
            .expect_err("drug on a generic order");
        assert_eq!(err.code(), "conversion");

        let generic = OrderResource::new()
            .create(
                &json!({
                    "type": "order",
                    "orderType": ORDER_TYPE,
                    "patient": PATIENT,
                    "concept": RICE,
                }),
                &fixture.ctx(&[]),
            )
            .expect("generic order is created");
        assert_eq!(generic["type"], "order");
        assert!(generic.get("drug").is_none());
    }

    #[test]
    fn test_list_filters_by_type() {
        let fixture = Fixture::new();
        let resource = OrderResource::new();
        resource
            .create(
                &json!({
                    "type": "order",
                    "orderType": ORDER_TYPE,
                    "patient": PATIENT,
                    "concept": RICE,
                }),
                &fixture.ctx(&[]),
            )
            .expect("generic order is created");

        let all = resource.list(&fixture.ctx(&[])).expect("list succeeds");
        assert_eq!(all.results.len(), 2);
        let drug_orders = resource
            .list(&fixture.ctx(&[("t", "drugorder")]))
            .expect("typed list succeeds");
        assert_eq!(drug_orders.results.len(), 1);
        assert_eq!(drug_orders.results[0]["uuid"], ORDER);

        let err = resource
            .list(&fixture.ctx(&[("t", "labtest")]))
            .expect_err("unknown type");
        assert_eq!(err.code(), "illegal_request");
    }

    #[test]
    fn test_search_by_patient() {
        let fixture = Fixture::new();
        let resource = OrderResource::new();
        let found = resource
            .list(&fixture.ctx(&[("patient", PATIENT), ("t", "drugorder")]))
            .expect("patient search");
        assert_eq!(found.results.len(), 1);

        let unknown = resource
            .list(&fixture.ctx(&[("patient", PERSON)]))
            .expect("a non-patient finds nothing");
        assert!(unknown.results.is_empty());
    }

    #[test]
    fn test_void_hides_from_list() {
        let fixture = Fixture::new();
        let resource = OrderResource::new();
        resource
            .delete(ORDER, &fixture.ctx(&[("reason", "stopped")]))
            .expect("void succeeds");
        let all = resource.list(&fixture.ctx(&[])).expect("list succeeds");
        assert!(all.results.is_empty());

        let with_voided = resource
            .list(&fixture.ctx(&[("includeAll", "true")]))
            .expect("list succeeds");
        assert_eq!(with_voided.results[0]["voided"], true);
    }

    #[test]
    fn test_drug_properties_are_typed() {
        let resource = OrderResource::new();
        assert_eq!(resource.property_type("drug"), PropertyType::Ref("drug"));
        assert_eq!(resource.property_type("quantity"), PropertyType::Integer);
        assert_eq!(resource.property_type("patient"), PropertyType::Ref("patient"));
    }
}
