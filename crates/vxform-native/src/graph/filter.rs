//! Filter trait, option resolution and the global filter registry.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;

use crate::error::{NativeError, Result};
use crate::frame::NativeFrame;
use crate::graph::parser::FilterArg;
use crate::pixfmt::{NativeColorRange, NativeColorSpace, PixelFormat};

/// Format of the frames travelling over a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinkFormat {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub color_space: NativeColorSpace,
    pub color_range: NativeColorRange,
}

impl LinkFormat {
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            width,
            height,
            format,
            color_space: NativeColorSpace::Unspecified,
            color_range: NativeColorRange::Unspecified,
        }
    }

    pub fn with_size(self, width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..self
        }
    }

    /// Whether `frame` has this link's size and pixel format.
    pub fn accepts(&self, frame: &NativeFrame) -> bool {
        frame.width == self.width && frame.height == self.height && frame.format == self.format
    }
}

/// A processing node of a filter graph.
///
/// Sources have no inputs, sinks no outputs. All other filters produce one
/// output frame per set of input frames.
pub trait Filter: Send {
    /// Registered filter name.
    fn name(&self) -> &'static str;

    fn nb_inputs(&self) -> usize {
        1
    }

    fn nb_outputs(&self) -> usize {
        1
    }

    /// Negotiate the output link format from the input link formats.
    ///
    /// Called again after every successful runtime command, so it must not
    /// reset state unrelated to the formats.
    fn configure(&mut self, inputs: &[LinkFormat]) -> Result<LinkFormat>;

    /// Process one frame per input pad.
    fn filter_frame(&mut self, inputs: Vec<NativeFrame>) -> Result<NativeFrame>;

    /// Apply a runtime command without rebuilding the graph.
    fn process_command(&mut self, cmd: &str, _arg: &str) -> Result<()> {
        Err(NativeError::NotSupported(format!(
            "{} does not accept command '{cmd}'",
            self.name()
        )))
    }
}

/// Options given to a filter, resolved against its declared option names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterArgs {
    filter: String,
    values: HashMap<String, String>,
}

impl FilterArgs {
    /// Map positional arguments onto `options` in order and check keys.
    pub fn resolve(filter: &str, args: &[FilterArg], options: &[&str]) -> Result<Self> {
        let mut values = HashMap::new();
        for (i, arg) in args.iter().enumerate() {
            let key = match &arg.key {
                Some(k) if options.contains(&k.as_str()) => k.clone(),
                Some(k) => {
                    return Err(NativeError::InvalidArgument(format!(
                        "{filter}: unknown option '{k}'"
                    )))
                }
                None => options.get(i).map(|k| k.to_string()).ok_or_else(|| {
                    NativeError::InvalidArgument(format!(
                        "{filter}: too many positional arguments"
                    ))
                })?,
            };
            values.insert(key, arg.value.clone());
        }
        Ok(Self {
            filter: filter.to_string(),
            values,
        })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// First of `keys` that is set (for aliased options).
    pub fn get_any(&self, keys: &[&str]) -> Option<&str> {
        keys.iter().find_map(|k| self.get(k))
    }

    /// Parse an option, falling back to `default` when unset.
    pub fn parse_or<T: FromStr>(&self, key: &str, default: T) -> Result<T> {
        match self.get(key) {
            None => Ok(default),
            Some(v) => parse_value(&self.filter, key, v),
        }
    }
}

/// Parse an option value, reporting the filter and key on failure.
pub fn parse_value<T: FromStr>(filter: &str, key: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        NativeError::InvalidArgument(format!("{filter}: invalid value '{value}' for '{key}'"))
    })
}

/// Constructor for a filter from its resolved options.
pub type FilterFactory = Arc<dyn Fn(&FilterArgs) -> Result<Box<dyn Filter>> + Send + Sync>;

/// A registered filter kind.
#[derive(Clone)]
pub struct FilterDefinition {
    pub name: String,
    pub options: &'static [&'static str],
    factory: FilterFactory,
}

impl FilterDefinition {
    pub fn new(
        name: impl Into<String>,
        options: &'static [&'static str],
        factory: impl Fn(&FilterArgs) -> Result<Box<dyn Filter>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            options,
            factory: Arc::new(factory),
        }
    }
}

/// Lookup table of filter kinds by name.
pub struct FilterRegistry {
    filters: RwLock<HashMap<String, FilterDefinition>>,
}

impl FilterRegistry {
    pub fn empty() -> Self {
        Self {
            filters: RwLock::new(HashMap::new()),
        }
    }

    /// Add or replace a filter kind.
    pub fn register(&self, definition: FilterDefinition) {
        tracing::debug!("Registering filter '{}'", definition.name);
        self.filters
            .write()
            .insert(definition.name.clone(), definition);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.filters.read().contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.filters.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Instantiate `name` with the given arguments.
    pub fn create(&self, name: &str, args: &[FilterArg]) -> Result<Box<dyn Filter>> {
        let definition = self
            .filters
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| NativeError::FilterNotFound(name.to_string()))?;
        let resolved = FilterArgs::resolve(name, args, definition.options)?;
        (definition.factory)(&resolved)
    }
}

/// The process-wide registry, populated with the built-in filters on first use.
pub fn registry() -> &'static FilterRegistry {
    static REGISTRY: OnceLock<FilterRegistry> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let registry = FilterRegistry::empty();
        crate::filters::register_builtins(&registry);
        registry
    })
}
