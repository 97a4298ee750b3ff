//! Input definitions, a caching resolver, and a `${input:ID}` config
//! renderer that walks arbitrary JSON-shaped config trees.

pub mod definition;
pub mod render;
pub mod resolver;

pub use definition::InputDefinition;
pub use render::render;
pub use resolver::FixedPrompter;
pub use resolver::InputPrompter;
pub use resolver::NullPrompter;
pub use resolver::ResolveError;
pub use resolver::Resolver;
