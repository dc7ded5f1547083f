//! Registry trait for self-registering implementations.

/// Base trait for implementation registries.
///
/// Each pluggable crate (headers, account, delivery) provides a `Registry`
/// struct per implementation, naming the key used under
/// `<section>.implementations.<name>` in the configuration and handing out
/// the factory that builds it.
pub trait ImplementationRegistry {
	/// Configuration name of the implementation, e.g. `"mempool"`.
	const NAME: &'static str;

	/// Factory function type defined by the owning crate.
	type Factory;

	fn factory() -> Self::Factory;
}
