use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use thiserror::Error;

/// Fields every transaction must carry, in the order they are checked
pub const REQUIRED_FIELDS: [&str; 5] = [
    "vehicle_id",
    "previous_owner",
    "new_owner",
    "price",
    "transaction_type",
];

/// Transaction type carried by the synthetic transaction in the genesis block
pub const GENESIS_TRANSACTION_TYPE: &str = "genesis";

/// Placeholder used for the identifier fields of the genesis transaction
const GENESIS_PLACEHOLDER: &str = "0";

/// Errors raised when a submitted transaction is malformed
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Transaction must be a JSON object")]
    NotAnObject,

    #[error("Missing field {0} in transaction")]
    MissingField(String),

    #[error("Invalid field {field} in transaction: {reason}")]
    InvalidField { field: String, reason: String },
}

/// A single vehicle ownership transfer
///
/// Any fields beyond the five required ones are kept in `extra` and written
/// back out next to them, so callers can attach their own metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Identifier of the vehicle changing hands
    pub vehicle_id: String,

    /// Owner before the transfer
    pub previous_owner: String,

    /// Owner after the transfer
    pub new_owner: String,

    /// Agreed price, never negative, kept exactly as submitted
    pub price: Number,

    /// Free-form tag such as "transfer" or "sale"
    pub transaction_type: String,

    /// Caller-supplied fields passed through unvalidated
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Transaction {
    /// Creates a new transaction without extra fields
    pub fn new(
        vehicle_id: impl Into<String>,
        previous_owner: impl Into<String>,
        new_owner: impl Into<String>,
        price: impl Into<Number>,
        transaction_type: impl Into<String>,
    ) -> Self {
        Transaction {
            vehicle_id: vehicle_id.into(),
            previous_owner: previous_owner.into(),
            new_owner: new_owner.into(),
            price: price.into(),
            transaction_type: transaction_type.into(),
            extra: Map::new(),
        }
    }

    /// Creates the synthetic transaction stored in the genesis block
    pub fn genesis() -> Self {
        Transaction::new(
            GENESIS_PLACEHOLDER,
            GENESIS_PLACEHOLDER,
            GENESIS_PLACEHOLDER,
            0u64,
            GENESIS_TRANSACTION_TYPE,
        )
    }

    /// Builds a transaction from an untyped JSON payload
    ///
    /// Every name in [`REQUIRED_FIELDS`] must be present. The first absent
    /// one is reported as [`ValidationError::MissingField`]; present fields
    /// of the wrong JSON type are reported as [`ValidationError::InvalidField`].
    pub fn from_json(payload: Value) -> Result<Self, ValidationError> {
        let mut fields = match payload {
            Value::Object(fields) => fields,
            _ => return Err(ValidationError::NotAnObject),
        };

        if let Some(missing) = REQUIRED_FIELDS
            .iter()
            .find(|field| !fields.contains_key(**field))
        {
            return Err(ValidationError::MissingField(missing.to_string()));
        }

        let transaction = Transaction {
            vehicle_id: take_string(&mut fields, "vehicle_id")?,
            previous_owner: take_string(&mut fields, "previous_owner")?,
            new_owner: take_string(&mut fields, "new_owner")?,
            price: take_number(&mut fields, "price")?,
            transaction_type: take_string(&mut fields, "transaction_type")?,
            extra: fields,
        };

        transaction.validate()?;
        Ok(transaction)
    }

    /// Checks the value constraints that the type system cannot express
    pub fn validate(&self) -> Result<(), ValidationError> {
        let non_negative = self.price.is_u64()
            || (!self.price.is_i64() && self.price.as_f64().map_or(false, |price| price >= 0.0));

        if !non_negative {
            return Err(ValidationError::InvalidField {
                field: "price".to_string(),
                reason: format!("expected a non-negative number, got {}", self.price),
            });
        }

        Ok(())
    }
}

fn take_string(fields: &mut Map<String, Value>, name: &str) -> Result<String, ValidationError> {
    match fields.remove(name) {
        Some(Value::String(value)) => Ok(value),
        Some(other) => Err(ValidationError::InvalidField {
            field: name.to_string(),
            reason: format!("expected a string, got {}", other),
        }),
        None => Err(ValidationError::MissingField(name.to_string())),
    }
}

fn take_number(fields: &mut Map<String, Value>, name: &str) -> Result<Number, ValidationError> {
    match fields.remove(name) {
        Some(Value::Number(value)) => Ok(value),
        Some(other) => Err(ValidationError::InvalidField {
            field: name.to_string(),
            reason: format!("expected a number, got {}", other),
        }),
        None => Err(ValidationError::MissingField(name.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn transfer_payload() -> Value {
        json!({
            "vehicle_id": "MH12AB1234",
            "previous_owner": "OwnerA",
            "new_owner": "OwnerB",
            "price": 300000,
            "transaction_type": "transfer"
        })
    }

    #[test]
    fn test_from_json() {
        let transaction = Transaction::from_json(transfer_payload()).unwrap();

        assert_eq!(transaction.vehicle_id, "MH12AB1234");
        assert_eq!(transaction.previous_owner, "OwnerA");
        assert_eq!(transaction.new_owner, "OwnerB");
        assert_eq!(transaction.price, Number::from(300000u64));
        assert_eq!(transaction.transaction_type, "transfer");
        assert!(transaction.extra.is_empty());
    }

    #[test]
    fn test_missing_field_is_named() {
        for field in REQUIRED_FIELDS {
            let mut payload = transfer_payload();
            payload.as_object_mut().unwrap().remove(field);

            let err = Transaction::from_json(payload).unwrap_err();
            assert_eq!(err, ValidationError::MissingField(field.to_string()));
            assert_eq!(err.to_string(), format!("Missing field {} in transaction", field));
        }
    }

    #[test]
    fn test_first_missing_field_wins() {
        let err = Transaction::from_json(json!({ "price": 1 })).unwrap_err();
        assert_eq!(err, ValidationError::MissingField("vehicle_id".to_string()));
    }

    #[test]
    fn test_not_an_object() {
        let err = Transaction::from_json(json!(["MH12AB1234"])).unwrap_err();
        assert_eq!(err, ValidationError::NotAnObject);
    }

    #[test]
    fn test_wrong_types_are_rejected() {
        let mut payload = transfer_payload();
        payload["price"] = json!("300000");
        assert!(matches!(
            Transaction::from_json(payload),
            Err(ValidationError::InvalidField { field, .. }) if field == "price"
        ));

        let mut payload = transfer_payload();
        payload["new_owner"] = Value::Null;
        assert!(matches!(
            Transaction::from_json(payload),
            Err(ValidationError::InvalidField { field, .. }) if field == "new_owner"
        ));
    }

    #[test]
    fn test_negative_price_is_rejected() {
        let mut payload = transfer_payload();
        payload["price"] = json!(-1.5);

        assert!(matches!(
            Transaction::from_json(payload),
            Err(ValidationError::InvalidField { field, .. }) if field == "price"
        ));
    }

    #[test]
    fn test_negative_integer_price_is_rejected() {
        let mut payload = transfer_payload();
        payload["price"] = json!(-300000);

        assert!(matches!(
            Transaction::from_json(payload),
            Err(ValidationError::InvalidField { field, .. }) if field == "price"
        ));
    }

    #[test]
    fn test_price_is_kept_exactly() {
        for price in [json!(9007199254740993u64), json!(300000), json!(12.5), json!(0)] {
            let mut payload = transfer_payload();
            payload["price"] = price.clone();

            let transaction = Transaction::from_json(payload).unwrap();
            let serialized = serde_json::to_value(&transaction).unwrap();

            assert_eq!(serialized["price"], price);
            assert_eq!(serialized["price"].to_string(), price.to_string());
        }
    }

    #[test]
    fn test_extra_fields_pass_through() {
        let mut payload = transfer_payload();
        payload["registration_office"] = json!("Pune RTO");

        let transaction = Transaction::from_json(payload).unwrap();
        assert_eq!(transaction.extra["registration_office"], json!("Pune RTO"));

        let serialized = serde_json::to_value(&transaction).unwrap();
        assert_eq!(serialized["registration_office"], json!("Pune RTO"));
        assert_eq!(serialized["vehicle_id"], json!("MH12AB1234"));
    }

    #[test]
    fn test_genesis_transaction() {
        let transaction = Transaction::genesis();

        assert_eq!(transaction.transaction_type, GENESIS_TRANSACTION_TYPE);
        assert_eq!(transaction.price, Number::from(0u64));
        assert!(transaction.validate().is_ok());
    }
}
