//! Concrete providers and the default platform-keyed registry.

mod directory;
mod execute;
mod file;
mod package;
mod service;
mod user;

pub use directory::DirectoryProvider;
pub use execute::ExecuteProvider;
pub use file::FileProvider;
pub use package::{AptProvider, HomebrewProvider, YumProvider};
pub use service::SystemdProvider;
pub use user::UserProvider;

use convergent::{PlatformRule, ProviderRegistry};

/// The registry every run starts from: filesystem and execute providers are
/// platform-agnostic; package and service managers key on platform identity.
pub fn default_registry() -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();

    registry.register("file", PlatformRule::Any, || Box::new(FileProvider));
    registry.register("directory", PlatformRule::Any, || {
        Box::new(DirectoryProvider)
    });
    registry.register("execute", PlatformRule::Any, || Box::new(ExecuteProvider));
    registry.register("user", PlatformRule::Any, || Box::new(UserProvider));

    registry.register("package", PlatformRule::Family("debian".into()), || {
        Box::new(AptProvider)
    });
    registry.register("package", PlatformRule::Family("rhel".into()), || {
        Box::new(YumProvider)
    });
    registry.register("package", PlatformRule::Platform("mac_os_x".into()), || {
        Box::new(HomebrewProvider)
    });

    registry.register("service", PlatformRule::Family("debian".into()), || {
        Box::new(SystemdProvider)
    });
    registry.register("service", PlatformRule::Family("rhel".into()), || {
        Box::new(SystemdProvider)
    });

    registry
}
