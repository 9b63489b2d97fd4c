//! `$ref` resolution against local files, remote URLs and the root definitions.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use tracing::{debug, warn};

use crate::error::ResolveError;
use crate::loader::{
    is_url, load_document, navigate_fragment, parse_schema, relative_file, split_ref, Fetch,
    HttpFetcher,
};
use crate::schema::{Definitions, Schema};
use crate::types::DEFINITIONS_POINTER;

/// Source files whose every definition is imported alongside the one referenced.
const ALL_DEFINITIONS_FILE: &str = "_definitions.json";

/// Resolves `$ref` values in place.
///
/// Holds the state shared across one generation run: the remote switch, the
/// fetcher and the cache of downloaded documents.
pub struct RefResolver {
    remote: bool,
    fetcher: Box<dyn Fetch>,
    cache: HashMap<String, Schema>,
}

impl RefResolver {
    /// A resolver using the HTTP fetcher. URL refs are only followed when
    /// `remote` is set.
    pub fn new(remote: bool) -> Self {
        Self::with_fetcher(remote, Box::new(HttpFetcher))
    }

    pub fn with_fetcher(remote: bool, fetcher: Box<dyn Fetch>) -> Self {
        Self {
            remote,
            fetcher,
            cache: HashMap::new(),
        }
    }

    /// Resolve every reachable `$ref` in `schema`.
    ///
    /// `locator` is the file or URL `schema` was read from. Internal
    /// `#/definitions/…` refs are looked up in `registry`; URL definitions
    /// are added to it. Definitions brought in by file refs are removed from
    /// the tree and returned for the caller to merge.
    ///
    /// # Errors
    ///
    /// Returns `ResolveError` when a referenced file can't be read or parsed,
    /// or a pointer into it doesn't exist. Failed URL downloads only warn.
    pub fn resolve(
        &mut self,
        schema: &mut Schema,
        locator: &str,
        registry: &mut Definitions,
    ) -> Result<Vec<(String, Schema)>, ResolveError> {
        let mut visited = HashSet::new();
        self.resolve_node(schema, locator, registry, &mut visited)?;

        let mut found = Vec::new();
        schema.drain_definitions(&mut found);
        Ok(found)
    }

    fn resolve_node(
        &mut self,
        schema: &mut Schema,
        locator: &str,
        registry: &mut Definitions,
        visited: &mut HashSet<String>,
    ) -> Result<(), ResolveError> {
        // The same fragment of a remote document may be reached from several
        // files and must be processed each time.
        if !is_url(locator) {
            let context = format!("CONTEXT:{locator}:{:p}", schema as *const Schema);
            if !visited.insert(context) {
                debug!(locator, "schema already processed, skipping");
                return Ok(());
            }
        }

        if !schema.reference.is_empty() {
            if visited.contains(&schema.reference) {
                debug!(reference = %schema.reference, "circular reference detected, skipping");
                return Ok(());
            }

            let reference = schema.reference.clone();
            let (base, fragment) = split_ref(&reference);

            if base.is_empty() {
                if let Some(name) = fragment.and_then(|f| f.strip_prefix(DEFINITIONS_POINTER)) {
                    if let Some(definition) = registry.get(name) {
                        debug!(definition = name, "inlining internal definition");
                        *schema = definition.clone();
                        schema.has_data = true;
                        return Ok(());
                    }
                    debug!(definition = name, "internal definition not registered yet");
                }
            }

            if self.remote && is_url(base) {
                return self.resolve_url(schema, base, fragment, registry, visited);
            }

            match relative_file(locator, base) {
                Ok(path) => return self.resolve_file(schema, &path, fragment, registry, visited),
                Err(reason) => debug!(reference = %reference, %reason, "not a relative file"),
            }
        }

        let children = schema
            .properties
            .values_mut()
            .chain(schema.definitions.values_mut())
            .chain(schema.pattern_properties.values_mut())
            .chain(schema.items.as_deref_mut())
            .chain(schema.if_schema.as_deref_mut())
            .chain(schema.then_schema.as_deref_mut())
            .chain(schema.else_schema.as_deref_mut())
            .chain(schema.not.as_deref_mut())
            .chain(schema.any_of.iter_mut())
            .chain(schema.all_of.iter_mut())
            .chain(schema.one_of.iter_mut());
        for child in children {
            self.resolve_node(child, locator, registry, visited)?;
        }

        Ok(())
    }

    fn resolve_file(
        &mut self,
        schema: &mut Schema,
        path: &Path,
        fragment: Option<&str>,
        registry: &mut Definitions,
        visited: &mut HashSet<String>,
    ) -> Result<(), ResolveError> {
        visited.insert(schema.reference.clone());
        if !visited.insert(format!("FILE:{}", path.display())) {
            debug!(path = %path.display(), "file already processed, skipping");
            return Ok(());
        }

        let source = path.display().to_string();
        let document = load_document(path)?;
        let full = parse_schema(&document, &source)?;

        // Keep the reference by name; the file's definitions travel with the
        // node and end up in the root registry.
        if let Some(name) = fragment.and_then(|f| f.strip_prefix(DEFINITIONS_POINTER)) {
            if !full.definitions.is_empty() {
                schema.definitions = full.definitions;
            }
            schema.reference = format!("#{DEFINITIONS_POINTER}{name}");
            schema.has_data = true;
            return Ok(());
        }

        let mut inlined = match fragment {
            Some(pointer) => {
                let part = navigate_fragment(&document, pointer, &source)?;
                let mut pointed = parse_schema(&part, &source)?;
                if !full.definitions.is_empty() {
                    pointed.definitions = full.definitions;
                }
                pointed
            }
            None => full,
        };

        self.resolve_node(&mut inlined, &source, registry, visited)?;

        *schema = inlined;
        schema.has_data = true;
        Ok(())
    }

    fn resolve_url(
        &mut self,
        schema: &mut Schema,
        base: &str,
        fragment: Option<&str>,
        registry: &mut Definitions,
        visited: &mut HashSet<String>,
    ) -> Result<(), ResolveError> {
        visited.insert(schema.reference.clone());

        let document = match self.cache.get(base) {
            Some(cached) => {
                debug!(url = base, "using cached schema");
                cached.clone()
            }
            None => {
                debug!(url = base, "downloading schema");
                let body = match self.fetcher.fetch(base) {
                    Ok(body) => body,
                    Err(err) => {
                        warn!(url = base, error = %err, "failed to download schema");
                        return Ok(());
                    }
                };
                let mut downloaded: Schema = match serde_json::from_slice(&body) {
                    Ok(schema) => schema,
                    Err(err) => {
                        warn!(url = base, error = %err, "failed to parse schema");
                        return Ok(());
                    }
                };

                // Cached before its own refs are followed so that documents
                // referring back to themselves hit the cache.
                self.cache.insert(base.to_string(), downloaded.clone());
                self.resolve_node(&mut downloaded, base, registry, visited)?;
                self.cache.insert(base.to_string(), downloaded.clone());
                downloaded
            }
        };

        let (stored, name) = match fragment.filter(|f| !f.is_empty()) {
            Some(pointer) => {
                let Some(mut pointed) = extract_pointer(&document, pointer, base) else {
                    return Ok(());
                };
                self.resolve_node(&mut pointed, base, registry, visited)?;

                let name = match pointer.strip_prefix(DEFINITIONS_POINTER) {
                    Some(name) => name.to_string(),
                    None => pointer.trim_matches('/').replace('/', "_"),
                };
                (pointed, name)
            }
            None => (document.clone(), definition_name(base)),
        };

        match registry.get(&name) {
            Some(existing) => {
                if !existing.semantically_eq(&stored) {
                    warn!(
                        definition = %name,
                        reference = %schema.reference,
                        "definition conflict, keeping the existing definition"
                    );
                }
            }
            None => {
                debug!(definition = %name, "adding definition");
                registry.insert(name.clone(), stored);

                if base.contains(ALL_DEFINITIONS_FILE) {
                    for (sibling, definition) in &document.definitions {
                        if !registry.contains_key(sibling) {
                            registry.insert(sibling.clone(), definition.clone());
                        }
                    }
                }
            }
        }

        schema.reference = format!("#{DEFINITIONS_POINTER}{name}");
        schema.has_data = true;
        Ok(())
    }
}

fn extract_pointer(document: &Schema, pointer: &str, base: &str) -> Option<Schema> {
    let value = match serde_json::to_value(document) {
        Ok(value) => value,
        Err(err) => {
            warn!(url = base, error = %err, "failed to encode cached schema");
            return None;
        }
    };
    let part = match navigate_fragment(&value, pointer, base) {
        Ok(part) => part,
        Err(err) => {
            warn!(url = base, error = %err, "failed to resolve JSON pointer");
            return None;
        }
    };
    match parse_schema(&part, base) {
        Ok(schema) => Some(schema),
        Err(err) => {
            warn!(url = base, error = %err, "failed to decode pointed schema");
            None
        }
    }
}

/// Definition name derived from a URL.
pub fn definition_name(url: &str) -> String {
    let name = url
        .replace("https://", "")
        .replace("http://", "")
        .replace(['/', '.', '-', '#', ':'], "_");

    match name.chars().next() {
        Some(first) if !first.is_ascii_alphabetic() => format!("def_{name}"),
        _ => name,
    }
}
