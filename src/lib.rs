//! Values Schema
//!
//! Generates a JSON Schema (draft-07) from an annotated Helm `values.yaml`.
//!
//! Every key becomes a property whose type, title, description and default
//! are inferred from the value and its comment. A comment may carry an
//! explicit schema fragment between `# @schema` markers, which takes
//! precedence over inference. `$ref`s in fragments are resolved against local
//! files and, optionally, remote URLs; their definitions are collected in the
//! root `definitions`.
//!
//! # Example
//!
//! ```
//! use values_schema::{generate_from_str, GenerateOptions};
//!
//! let values = "\
//! ## @schema
//! ## type: integer
//! ## minimum: 1
//! ## @schema
//! ## Number of replicas
//! replicas: 3
//! image: nginx
//! ";
//!
//! let schema = generate_from_str(values, "values.yaml", &GenerateOptions::new()).unwrap();
//!
//! assert_eq!(schema.properties["replicas"].minimum, Some(1));
//! assert_eq!(schema.properties["image"].title, "image");
//! // keys without an annotation are required by default
//! assert_eq!(schema.required.names, ["image"]);
//! ```
//!
//! # Annotation Format
//!
//! ```yaml
//! # @schema
//! # type: [string, null]
//! # format: uri
//! # required: true
//! # @schema
//! # Description of the key
//! key: value
//! ```
//!
//! | Field | Effect |
//! |-------|--------|
//! | `required: true` | Add the key to its parent's `required` list |
//! | `$ref` | Resolve a file / URL / `#/definitions/...` schema |
//! | `x-*` | Kept verbatim in the output |

mod annotation;
mod error;
mod inference;
mod legacy;
mod loader;
mod resolver;
mod schema;
mod types;
mod validator;
mod values;

pub use annotation::{parse_comment, strip_helm_docs_tags, strip_leading_paragraphs};
pub use error::{AnnotationError, GenerateError, ResolveError, ValidateError};
pub use inference::{generate, generate_from_str, generate_with, Inference};
pub use legacy::{helm_docs_type, parse_helm_docs_comment, HelmDocsComment};
pub use loader::{
    is_url, load_document, load_schema, navigate_fragment, parse_schema, relative_file,
    split_ref, Fetch, HttpFetcher,
};
pub use resolver::{definition_name, RefResolver};
pub use schema::{equals, AdditionalProperties, CustomAnnotations, Definitions, Schema};
pub use types::{
    GenerateOptions, Required, SchemaType, SkipAutoGeneration, DRAFT_07, SUPPORTED_FORMATS,
};
pub use validator::{validate, validate_syntax};
pub use values::{parse_values, MappingEntry, Scalar, Tag, YamlNode};
