//! Per-entity query surface: criteria selection, exact-match lookup, method
//! predicates and constant lookups.

use crate::backend::PersistenceBackend;
use crate::entity::Entity;
use crate::error::AccessError;
use crate::metadata::MetadataService;
use crate::query::{compile, normalize, Combinator, Filter, FilterTriple, Operator};
use crate::value::{EntityId, FieldValue};
use serde_json::Value;

/// A method to call on each entity and the value its result is compared with.
#[derive(Clone, Debug, PartialEq)]
pub struct MethodFilter {
    pub method: String,
    pub expected: FieldValue,
    pub args: Vec<FieldValue>,
    pub op: Operator,
}

impl MethodFilter {
    pub fn new(method: impl Into<String>, expected: impl Into<FieldValue>) -> Self {
        MethodFilter {
            method: method.into(),
            expected: expected.into(),
            args: Vec::new(),
            op: Operator::Eq,
        }
    }

    pub fn args(mut self, args: Vec<FieldValue>) -> Self {
        self.args = args;
        self
    }

    pub fn op(mut self, op: Operator) -> Self {
        self.op = op;
        self
    }

    /// `[method, expected, args?, op?]`
    pub fn from_json(v: &Value) -> Result<Self, AccessError> {
        let items = v
            .as_array()
            .filter(|a| (2..=4).contains(&a.len()))
            .ok_or_else(|| AccessError::MalformedFilter(format!("expected [method, value, args?, op?], got {}", v)))?;
        let method = items[0]
            .as_str()
            .ok_or_else(|| AccessError::MalformedFilter(format!("method name must be a string, got {}", items[0])))?;
        let args = match items.get(2) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(a)) => a.iter().map(FieldValue::from_json).collect(),
            Some(other) => vec![FieldValue::from_json(other)],
        };
        let op = match items.get(3) {
            None | Some(Value::Null) => Operator::Eq,
            Some(Value::String(op)) => Operator::parse(op)?,
            Some(other) => return Err(AccessError::UnsupportedOperator(other.to_string())),
        };
        Ok(MethodFilter::new(method, FieldValue::from_json(&items[1]))
            .args(args)
            .op(op))
    }
}

pub struct Repository<'a, B: PersistenceBackend + ?Sized> {
    backend: &'a B,
    metadata: &'a MetadataService,
    entity: String,
    selection: Vec<Box<dyn Entity>>,
}

impl<'a, B: PersistenceBackend + ?Sized> Repository<'a, B> {
    /// Fails with `ClassNotFound` for an unknown entity name.
    pub fn new(backend: &'a B, metadata: &'a MetadataService, entity: &str) -> Result<Self, AccessError> {
        let entity = metadata.mapping(entity)?.qualified_name.clone();
        Ok(Repository {
            backend,
            metadata,
            entity,
            selection: Vec::new(),
        })
    }

    /// Qualified name of the entity type this repository serves.
    pub fn entity_name(&self) -> &str {
        &self.entity
    }

    pub fn find(&self, id: &EntityId) -> Result<Option<Box<dyn Entity>>, AccessError> {
        self.backend.find_by_id(&self.entity, id)
    }

    pub fn find_all(&self) -> Result<Vec<Box<dyn Entity>>, AccessError> {
        self.backend.find_all(&self.entity)
    }

    /// Load every entity into the selection.
    pub fn all(&mut self) -> Result<&mut Self, AccessError> {
        self.selection = self.find_all()?;
        Ok(self)
    }

    pub fn selection(&self) -> &[Box<dyn Entity>] {
        &self.selection
    }

    pub fn fetch(self) -> Vec<Box<dyn Entity>> {
        self.selection
    }

    /// Same as [`Repository::select_and`].
    pub fn select(&self, args: &[Value]) -> Result<Vec<Box<dyn Entity>>, AccessError> {
        self.select_and(args)
    }

    pub fn select_and(&self, args: &[Value]) -> Result<Vec<Box<dyn Entity>>, AccessError> {
        self.select_with(Combinator::And, args)
    }

    pub fn select_or(&self, args: &[Value]) -> Result<Vec<Box<dyn Entity>>, AccessError> {
        self.select_with(Combinator::Or, args)
    }

    fn select_with(&self, combinator: Combinator, args: &[Value]) -> Result<Vec<Box<dyn Entity>>, AccessError> {
        match normalize(args)? {
            None => self.find_all(),
            Some(triples) => self.matching(&Filter::Combined(combinator, triples)),
        }
    }

    /// Run a typed filter through the backend's matcher.
    pub fn matching(&self, filter: &Filter) -> Result<Vec<Box<dyn Entity>>, AccessError> {
        let filter = match filter {
            Filter::Single(t) => Filter::Single(self.resolve_triple(t)?),
            Filter::Combined(c, triples) => Filter::Combined(
                *c,
                triples
                    .iter()
                    .map(|t| self.resolve_triple(t))
                    .collect::<Result<_, _>>()?,
            ),
        };
        let expr = compile(&filter)?;
        tracing::debug!(entity = %self.entity, expressions = expr.len(), "matching criteria");
        self.backend.matching(&self.entity, &expr)
    }

    fn resolve_triple(&self, t: &FilterTriple) -> Result<FilterTriple, AccessError> {
        Ok(FilterTriple {
            op: t.op,
            field: self.metadata.resolve_field(&self.entity, &t.field)?,
            value: t.value.clone(),
        })
    }

    /// Entities whose fields equal every given value.
    pub fn find_by<K, I>(&self, criteria: I) -> Result<Vec<Box<dyn Entity>>, AccessError>
    where
        K: AsRef<str>,
        I: IntoIterator<Item = (K, FieldValue)>,
    {
        let triples: Vec<FilterTriple> = criteria
            .into_iter()
            .map(|(k, v)| FilterTriple::eq(k.as_ref(), v))
            .collect();
        if triples.is_empty() {
            return self.find_all();
        }
        self.matching(&Filter::from_triples(Combinator::And, triples))
    }

    pub fn find_via_method(
        &self,
        method: &str,
        expected: impl Into<FieldValue>,
        args: Vec<FieldValue>,
        op: Operator,
    ) -> Result<Vec<Box<dyn Entity>>, AccessError> {
        let filter = MethodFilter::new(method, expected).args(args).op(op);
        self.find_via_multiple_methods(&[filter], Combinator::And, None)
    }

    /// Keep entities whose method results satisfy all (`And`) or any (`Or`) of
    /// `methods`. Runs over `entities` when given, else over everything stored.
    /// Input order is preserved.
    pub fn find_via_multiple_methods(
        &self,
        methods: &[MethodFilter],
        combinator: Combinator,
        entities: Option<Vec<Box<dyn Entity>>>,
    ) -> Result<Vec<Box<dyn Entity>>, AccessError> {
        let entities = match entities {
            Some(e) => e,
            None => self.find_all()?,
        };
        let mut out = Vec::new();
        for entity in entities {
            let mut results = Vec::with_capacity(methods.len());
            for m in methods {
                let observed = entity.call_method(&m.method, &m.args)?;
                results.push(m.op.apply(&observed, &m.expected)?);
            }
            let keep = match combinator {
                Combinator::And => results.iter().all(|r| *r),
                Combinator::Or => results.iter().any(|r| *r),
            };
            if keep {
                out.push(entity);
            }
        }
        Ok(out)
    }

    pub fn apply_logical_operator(&self, op: &str, left: &FieldValue, right: &FieldValue) -> Result<bool, AccessError> {
        crate::query::apply_logical_operator(op, left, right)
    }

    /// Position of `value` in the named constant list of this entity type, or of
    /// `other` when given. The constant is looked up by its exact name, then upper-cased.
    pub fn index_from_constant(&self, constant: &str, value: &str, other: Option<&str>) -> Result<usize, AccessError> {
        let owner = other.unwrap_or(self.entity.as_str());
        let mapping = self.metadata.mapping(owner)?;
        let labels = mapping
            .constants
            .get(constant)
            .or_else(|| mapping.constants.get(&constant.to_uppercase()))
            .ok_or_else(|| {
                AccessError::ConstantLookup(format!(
                    "the constant \"{}::{}\" is not defined",
                    mapping.qualified_name, constant
                ))
            })?;
        labels.iter().position(|l| l == value).ok_or_else(|| {
            AccessError::ConstantLookup(format!(
                "the value \"{}\" was not found inside \"{}::{}\"",
                value, mapping.qualified_name, constant
            ))
        })
    }
}

impl<B: PersistenceBackend + ?Sized> std::fmt::Debug for Repository<'_, B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("entity", &self.entity)
            .field("selection", &self.selection.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn method_filter_from_json() {
        let f = MethodFilter::from_json(&json!(["isActive", true])).unwrap();
        assert_eq!(f, MethodFilter::new("isActive", true));
        let f = MethodFilter::from_json(&json!(["countVisits", 3, [2024], "gte"])).unwrap();
        assert_eq!(f.args, vec![FieldValue::Int(2024)]);
        assert_eq!(f.op, Operator::Gte);
        assert!(MethodFilter::from_json(&json!(["only"])).is_err());
        assert!(matches!(
            MethodFilter::from_json(&json!(["m", 1, [], "like"])),
            Err(AccessError::UnsupportedOperator(_))
        ));
    }

    #[test]
    fn method_filter_operator_must_be_text() {
        for op in [json!(5), json!(true), json!({})] {
            let r = MethodFilter::from_json(&json!(["isLarge", true, [], op]));
            assert!(matches!(r, Err(AccessError::UnsupportedOperator(_))), "{:?}", op);
        }
        let f = MethodFilter::from_json(&json!(["isLarge", true, [], null])).unwrap();
        assert_eq!(f.op, Operator::Eq);
    }
}
