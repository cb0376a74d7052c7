//! Demo host: one plugin with a clean slot and one slot whose instance is
//! kept alive by a process-wide cache.

use once_cell::sync::OnceCell;
use std::sync::Arc;
use unload_verifier_core::{Component, InMemoryRegistry, PluginId, Slot};

static DEMO_CACHE: OnceCell<Arc<dyn Component>> = OnceCell::new();

const DEMO_PLUGIN: &str = "demo.plugin";

struct DemoFileType;

impl Component for DemoFileType {}

struct DemoCachedIndex;

impl Component for DemoCachedIndex {}

struct PlatformFileType;

impl Component for PlatformFileType {}

struct PlatformService;

impl Component for PlatformService {}

fn component(value: impl Component) -> Arc<dyn Component> {
    Arc::new(value)
}

/// Builds the demo registry.
///
/// Registration only fails on duplicate or unknown slots, which the fixed
/// layout below cannot produce, so failures are skipped with a log line.
pub fn demo_registry(base_layer: &PluginId) -> InMemoryRegistry {
    let registry = InMemoryRegistry::new();
    let plugin = PluginId::new(DEMO_PLUGIN).unwrap_or_else(|_| base_layer.clone());

    let slots = [
        Slot::dynamic("demo.fileType"),
        Slot::dynamic("demo.index").owned_by(plugin.clone()),
        Slot::fixed("demo.applicationService"),
    ];
    for slot in slots {
        if let Err(err) = registry.register_slot(slot) {
            log::warn!("event=demo_setup module=cli status=error error={err}");
        }
    }

    let cached: Arc<dyn Component> = Arc::new(DemoCachedIndex);
    let _ = DEMO_CACHE.set(cached.clone());

    let instances = [
        ("demo.fileType", base_layer.clone(), component(PlatformFileType)),
        ("demo.fileType", plugin.clone(), component(DemoFileType)),
        ("demo.index", plugin, cached),
        (
            "demo.applicationService",
            base_layer.clone(),
            component(PlatformService),
        ),
    ];
    for (slot, owner, component) in instances {
        if let Err(err) = registry.register(slot, owner, component) {
            log::warn!("event=demo_setup module=cli status=error error={err}");
        }
    }
    registry
}

#[cfg(test)]
mod tests {
    use super::demo_registry;
    use unload_verifier_core::{ComponentRegistry, PluginId};

    #[test]
    fn demo_registry_declares_three_slots() {
        let registry = demo_registry(&PluginId::base_layer());
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.instance_count("demo.fileType"), 2);
        let dynamic = registry
            .list_slots()
            .into_iter()
            .filter(|slot| slot.is_dynamic)
            .count();
        assert_eq!(dynamic, 2);
    }
}
