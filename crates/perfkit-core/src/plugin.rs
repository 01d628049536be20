//! Static catalog metadata for a registered source or encoder kind. This is
//! a passive description a transport can browse — it carries no code and
//! does no loading; the factory/encoder behind a name is supplied by the
//! embedder through [`Manager::register_source_factory`](crate::manager::Manager::register_source_factory)
//! or [`Manager::register_encoder`](crate::manager::Manager::register_encoder)
//! exactly as before. Grounded on `pkd-source-info.h`'s plain
//! name/description/version getters, minus the dynamic `GType` plumbing
//! around it.

/// Which registry a [`PluginInfo`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginType {
    Source,
    Encoder,
}

/// Human-facing metadata an embedder attaches when it registers a source
/// or encoder kind, so a transport can list what's available without
/// touching live pipeline state.
#[derive(Debug, Clone)]
pub struct PluginInfo {
    name: String,
    version: String,
    copyright: String,
    description: String,
    plugin_type: PluginType,
}

impl PluginInfo {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        copyright: impl Into<String>,
        description: impl Into<String>,
        plugin_type: PluginType,
    ) -> Self {
        PluginInfo {
            name: name.into(),
            version: version.into(),
            copyright: copyright.into(),
            description: description.into(),
            plugin_type,
        }
    }

    pub fn get_name(&self) -> &str {
        &self.name
    }

    pub fn get_version(&self) -> &str {
        &self.version
    }

    pub fn get_copyright(&self) -> &str {
        &self.copyright
    }

    pub fn get_description(&self) -> &str {
        &self.description
    }

    pub fn get_plugin_type(&self) -> PluginType {
        self.plugin_type
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn getters_echo_constructor_fields() {
        let info = PluginInfo::new("simple", "0.1.0", "(C) Perfkit Contributors", "a timer-driven sampler", PluginType::Source);
        assert_eq!(info.get_name(), "simple");
        assert_eq!(info.get_version(), "0.1.0");
        assert_eq!(info.get_copyright(), "(C) Perfkit Contributors");
        assert_eq!(info.get_description(), "a timer-driven sampler");
        assert_eq!(info.get_plugin_type(), PluginType::Source);
    }
}
