use ddrcheck_core::validators_api::ValidatorRegistry;

mod sql;

pub mod format;
pub mod kinds;
pub mod pk;

/// Validators shown as matrix columns, in order.
pub fn default_registry() -> ValidatorRegistry {
    let mut reg = ValidatorRegistry::new();
    reg.register("format", format::validator)
        .register("pk", pk::validator);
    reg
}
