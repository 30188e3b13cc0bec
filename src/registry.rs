//! Plugin and parameter registry of a container.
//!
//! The native side assigns ids. Plugin names (and parameter names within a
//! plugin) should be unique, since the XML form identifies elements by name.
//!
//! Every mutating call takes `&mut Container`, so no [`crate::Cursor`] over the
//! same container can be alive across a structural change.

use crate::container::{to_cstring, Container};
use crate::error::{Result, VrmatError};
use crate::plugin::{ElementId, ParamId, PluginId};
use crate::status::NativeCall;

impl Container {
    /// Add a plugin, e.g. `("Gold", "BRDFVRayMtl", "brdf")`.
    ///
    /// Rejected (id < 1) for duplicate names or combinations the native side
    /// refuses.
    pub fn add_plugin(&mut self, name: &str, plugin_type: &str, class: &str) -> Result<PluginId> {
        let call = NativeCall::AddPlugin;
        let handle = self.live(call.name())?;
        let c_name = to_cstring(name, "plugin name")?;
        let c_type = to_cstring(plugin_type, "plugin type")?;
        let c_class = to_cstring(class, "plugin class")?;

        let raw = unsafe {
            (self.table().add_plugin)(handle.as_ptr(), c_name.as_ptr(), c_type.as_ptr(), c_class.as_ptr())
        };
        call.check(raw.into(), self.id(), || {
            format!("plugin '{}' ({} / {})", name, plugin_type, class)
        })?;

        let id = PluginId::new(raw)
            .ok_or_else(|| VrmatError::abi(call.name(), self.id(), "accepted id below 1"))?;
        log::debug!("Added {} '{}' to container {}", id, name, self.id());
        Ok(id)
    }

    /// Add a parameter to a plugin. A non-zero `custom` marks user data rather
    /// than a parameter the plugin type defines; the value is stored as given.
    pub fn add_parameter(
        &mut self,
        plugin: PluginId,
        name: &str,
        param_type: &str,
        custom: i32,
    ) -> Result<ParamId> {
        let call = NativeCall::AddParameter;
        let handle = self.live(call.name())?;
        let c_name = to_cstring(name, "parameter name")?;
        let c_type = to_cstring(param_type, "parameter type")?;

        let raw = unsafe {
            (self.table().add_parameter)(
                handle.as_ptr(),
                plugin.get(),
                c_name.as_ptr(),
                c_type.as_ptr(),
                custom,
            )
        };
        call.check(raw.into(), self.id(), || {
            format!("parameter '{}' ({}) on {}", name, param_type, plugin)
        })?;

        ParamId::new(raw).ok_or_else(|| VrmatError::abi(call.name(), self.id(), "accepted id below 1"))
    }

    /// Resolve a name to an element id.
    ///
    /// With `plugin` set, looks up a parameter of that plugin; otherwise a
    /// plugin. A miss is `Ok(None)`, not an error.
    pub fn element_id(&self, plugin: Option<PluginId>, name: &str) -> Result<Option<ElementId>> {
        let call = NativeCall::GetElementId;
        let handle = self.live(call.name())?;
        let c_name = to_cstring(name, "element name")?;
        let scope = plugin.map(PluginId::get).unwrap_or(0);

        let raw = unsafe { (self.table().get_element_id)(handle.as_ptr(), scope, c_name.as_ptr()) };
        if !call.succeeded(raw.into()) {
            log::debug!("{} '{}' missed on {}", call.name(), name, self.id());
            return Ok(None);
        }
        Ok(ElementId::new(raw))
    }

    /// Like [`Container::element_id`], but a miss is a `NotFound` error
    pub fn require_element_id(&self, plugin: Option<PluginId>, name: &str) -> Result<ElementId> {
        self.element_id(plugin, name)?.ok_or_else(|| {
            let scope = plugin.map(|p| format!(" under {}", p)).unwrap_or_default();
            VrmatError::not_found(NativeCall::GetElementId.name(), self.id(), format!("'{}'{}", name, scope))
        })
    }

    /// Id of the plugin called `name`
    pub fn plugin_id(&self, name: &str) -> Result<Option<PluginId>> {
        Ok(self.element_id(None, name)?.map(ElementId::as_plugin))
    }

    /// Id of the parameter `name` of `plugin`
    pub fn param_id(&self, plugin: PluginId, name: &str) -> Result<Option<ParamId>> {
        Ok(self.element_id(Some(plugin), name)?.map(ElementId::as_param))
    }

    /// Remove a plugin (with its parameters) or a parameter
    pub fn remove_element(&mut self, element: impl Into<ElementId>) -> Result<()> {
        let element = element.into();
        let call = NativeCall::RemoveElement;
        let handle = self.live(call.name())?;

        let status = unsafe { (self.table().remove_element)(handle.as_ptr(), element.get()) };
        call.check(status.into(), self.id(), || format!("{} could not be removed", element))?;

        log::debug!("Removed {} from container {}", element, self.id());
        Ok(())
    }
}
