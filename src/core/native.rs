//! In-process routing engine binding
//!
//! The native transport talks to OSRM through the `libosrmc` C wrapper. The
//! library is opened with `dlopen` at startup, so the binary builds and runs
//! without it; selecting the native transport on a machine that lacks it is a
//! configuration error rather than a link failure.
//!
//! # Thread model
//!
//! One [`RoutingEngine`] per worker, created inside the worker thread and never
//! shared. Engine construction goes through [`EngineFactory::create`], which
//! callers must serialize (the worker pool holds its init lock around it):
//! OSRM's engine constructor is not safe to run concurrently.
//!
//! # Precision
//!
//! `libosrmc` takes coordinates as `float`. Locations carry 6 decimals, so a
//! native request can be off by up to about 1e-5 degrees (around a meter)
//! from the same request sent over HTTP.

use std::path::Path;

use crate::core::error::Result;
use crate::core::sampler::LocationPair;

/// Distances of every route alternative returned for one request
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RouteSummary {
    pub distances: Vec<f64>,
}

impl RouteSummary {
    pub fn total_distance(&self) -> f64 {
        self.distances.iter().sum()
    }
}

/// A worker-owned routing engine instance
pub trait RoutingEngine {
    fn route(&mut self, pair: &LocationPair) -> Result<RouteSummary>;
}

/// Builds engines from a prepared dataset
pub trait EngineFactory: Send + Sync {
    fn create(&self, resource: &Path, algorithm: &str) -> Result<Box<dyn RoutingEngine>>;
}

#[cfg(unix)]
pub use osrmc::OsrmcBinding;

/// Resolve the binding capability: load `libosrmc` or explain why not
#[cfg(unix)]
pub fn load_binding() -> Result<std::sync::Arc<dyn EngineFactory>> {
    Ok(std::sync::Arc::new(OsrmcBinding::load()?))
}

#[cfg(not(unix))]
pub fn load_binding() -> Result<std::sync::Arc<dyn EngineFactory>> {
    Err(crate::core::error::Error::BindingUnavailable(
        "dynamic loading of libosrmc is only supported on unix".to_string(),
    ))
}

#[cfg(unix)]
mod osrmc {
    use std::ffi::{CStr, CString};
    use std::os::raw::{c_char, c_void};
    use std::path::Path;
    use std::ptr;
    use std::sync::Arc;

    use log::{debug, warn};

    use super::{EngineFactory, RouteSummary, RoutingEngine};
    use crate::core::error::{Error, Result};
    use crate::core::sampler::LocationPair;

    type Handle = *mut c_void;
    type ErrorHandle = *mut c_void;

    type ErrorMessageFn = unsafe extern "C" fn(ErrorHandle) -> *const c_char;
    type ErrorDestructFn = unsafe extern "C" fn(ErrorHandle);
    type ConfigConstructFn = unsafe extern "C" fn(*const c_char, *mut ErrorHandle) -> Handle;
    type ConfigSetAlgorithmFn = unsafe extern "C" fn(Handle, *const c_char, *mut ErrorHandle);
    type DestructFn = unsafe extern "C" fn(Handle);
    type OsrmConstructFn = unsafe extern "C" fn(Handle, *mut ErrorHandle) -> Handle;
    type ParamsConstructFn = unsafe extern "C" fn(*mut ErrorHandle) -> Handle;
    type AddCoordinateFn = unsafe extern "C" fn(Handle, f32, f32, *mut ErrorHandle);
    type RouteFn = unsafe extern "C" fn(Handle, Handle, *mut ErrorHandle) -> Handle;
    type DistanceFn = unsafe extern "C" fn(Handle, *mut ErrorHandle) -> f32;

    /// Library names tried in order after `OSRMC_LIB_PATH`
    const CANDIDATES: &[&str] = &["libosrmc.so", "libosrmc.so.5", "libosrmc.dylib"];

    /// Resolved `libosrmc` entry points
    struct OsrmcLibrary {
        handle: Handle,
        error_message: ErrorMessageFn,
        error_destruct: ErrorDestructFn,
        config_construct: ConfigConstructFn,
        config_destruct: DestructFn,
        config_set_algorithm: Option<ConfigSetAlgorithmFn>,
        osrm_construct: OsrmConstructFn,
        osrm_destruct: DestructFn,
        route_params_construct: ParamsConstructFn,
        route_params_destruct: DestructFn,
        params_add_coordinate: AddCoordinateFn,
        route: RouteFn,
        route_response_destruct: DestructFn,
        route_response_distance: DistanceFn,
    }

    // SAFETY: the handle is only passed to dlclose on drop and every other
    // field is a plain function pointer. Engine construction, the one
    // non-reentrant entry point, is serialized by the caller.
    unsafe impl Send for OsrmcLibrary {}
    unsafe impl Sync for OsrmcLibrary {}

    fn dl_error() -> String {
        // SAFETY: dlerror returns a thread-local C string or null
        unsafe {
            let msg = libc::dlerror();
            if msg.is_null() {
                "unknown dlopen error".to_string()
            } else {
                CStr::from_ptr(msg).to_string_lossy().into_owned()
            }
        }
    }

    fn open(name: &str) -> std::result::Result<Handle, String> {
        let c_name = CString::new(name).map_err(|e| e.to_string())?;
        // SAFETY: c_name is a valid NUL-terminated string
        let handle = unsafe { libc::dlopen(c_name.as_ptr(), libc::RTLD_NOW | libc::RTLD_LOCAL) };
        if handle.is_null() {
            Err(dl_error())
        } else {
            Ok(handle)
        }
    }

    /// Look up `name`; `T` must be the function pointer type of the symbol
    unsafe fn symbol<T: Copy>(handle: Handle, name: &str) -> Option<T> {
        let c_name = CString::new(name).ok()?;
        let sym = libc::dlsym(handle, c_name.as_ptr());
        if sym.is_null() {
            None
        } else {
            Some(std::mem::transmute_copy::<*mut c_void, T>(&sym))
        }
    }

    unsafe fn required<T: Copy>(handle: Handle, name: &str) -> Result<T> {
        symbol(handle, name).ok_or_else(|| {
            Error::BindingUnavailable(format!("libosrmc is missing symbol '{name}'"))
        })
    }

    /// Engine factory backed by a loaded `libosrmc`
    pub struct OsrmcBinding {
        lib: Arc<OsrmcLibrary>,
    }

    impl OsrmcBinding {
        /// Open the first loadable candidate and resolve its symbols
        ///
        /// `OSRMC_LIB_PATH` is tried first, then the build-time default, then
        /// the usual library names.
        pub fn load() -> Result<Self> {
            let mut candidates: Vec<String> = Vec::new();
            if let Ok(path) = std::env::var("OSRMC_LIB_PATH") {
                candidates.push(path);
            }
            if let Some(path) = option_env!("OSRMC_DEFAULT_PATH") {
                candidates.push(path.to_string());
            }
            candidates.extend(CANDIDATES.iter().map(|s| s.to_string()));
            Self::load_from(&candidates)
        }

        /// Open the first loadable library among `candidates`
        pub fn load_from(candidates: &[String]) -> Result<Self> {
            let mut failures = Vec::new();
            for name in candidates {
                match open(name) {
                    Ok(handle) => {
                        debug!("Loaded native routing binding from {name}");
                        // SAFETY: handle is a live dlopen handle, closed on failure
                        return match unsafe { OsrmcLibrary::resolve(handle) } {
                            Ok(lib) => Ok(Self { lib: Arc::new(lib) }),
                            Err(e) => {
                                unsafe { libc::dlclose(handle) };
                                Err(e)
                            }
                        };
                    }
                    Err(e) => failures.push(e),
                }
            }

            Err(Error::BindingUnavailable(format!(
                "could not load libosrmc (set OSRMC_LIB_PATH): {}",
                failures.join("; ")
            )))
        }
    }

    impl EngineFactory for OsrmcBinding {
        fn create(&self, resource: &Path, algorithm: &str) -> Result<Box<dyn RoutingEngine>> {
            let engine = OsrmcEngine::construct(Arc::clone(&self.lib), resource, algorithm)?;
            Ok(Box::new(engine))
        }
    }

    impl OsrmcLibrary {
        unsafe fn resolve(handle: Handle) -> Result<Self> {
            Ok(Self {
                handle,
                error_message: required(handle, "osrmc_error_message")?,
                error_destruct: required(handle, "osrmc_error_destruct")?,
                config_construct: required(handle, "osrmc_config_construct")?,
                config_destruct: required(handle, "osrmc_config_destruct")?,
                config_set_algorithm: symbol(handle, "osrmc_config_set_algorithm"),
                osrm_construct: required(handle, "osrmc_osrm_construct")?,
                osrm_destruct: required(handle, "osrmc_osrm_destruct")?,
                route_params_construct: required(handle, "osrmc_route_params_construct")?,
                route_params_destruct: required(handle, "osrmc_route_params_destruct")?,
                params_add_coordinate: required(handle, "osrmc_params_add_coordinate")?,
                route: required(handle, "osrmc_route")?,
                route_response_destruct: required(handle, "osrmc_route_response_destruct")?,
                route_response_distance: required(handle, "osrmc_route_response_distance")?,
            })
        }

        /// Consume an error handle, turning it into a message
        unsafe fn take_error(&self, err: ErrorHandle) -> Option<String> {
            if err.is_null() {
                return None;
            }
            let msg = (self.error_message)(err);
            let text = if msg.is_null() {
                "unknown libosrmc error".to_string()
            } else {
                CStr::from_ptr(msg).to_string_lossy().into_owned()
            };
            (self.error_destruct)(err);
            Some(text)
        }
    }

    impl Drop for OsrmcLibrary {
        fn drop(&mut self) {
            // SAFETY: every engine holds an Arc to the library, so none is alive
            unsafe {
                libc::dlclose(self.handle);
            }
        }
    }

    /// One OSRM instance bound to a dataset
    struct OsrmcEngine {
        lib: Arc<OsrmcLibrary>,
        config: Handle,
        osrm: Handle,
    }

    impl OsrmcEngine {
        fn construct(lib: Arc<OsrmcLibrary>, resource: &Path, algorithm: &str) -> Result<Self> {
            let base_path = CString::new(resource.to_string_lossy().as_bytes())
                .map_err(|e| Error::EngineInit(e.to_string()))?;
            let c_algorithm =
                CString::new(algorithm).map_err(|e| Error::EngineInit(e.to_string()))?;

            // SAFETY: all pointers come from libosrmc and are checked before use
            unsafe {
                let mut err: ErrorHandle = ptr::null_mut();
                let config = (lib.config_construct)(base_path.as_ptr(), &mut err);
                if let Some(msg) = lib.take_error(err) {
                    return Err(Error::EngineInit(msg));
                }

                match lib.config_set_algorithm {
                    Some(set_algorithm) => {
                        set_algorithm(config, c_algorithm.as_ptr(), &mut err);
                        if let Some(msg) = lib.take_error(err) {
                            (lib.config_destruct)(config);
                            return Err(Error::EngineInit(msg));
                        }
                    }
                    None => warn!(
                        "libosrmc cannot select an algorithm; '{algorithm}' ignored, \
                         using the library default"
                    ),
                }

                let osrm = (lib.osrm_construct)(config, &mut err);
                if let Some(msg) = lib.take_error(err) {
                    (lib.config_destruct)(config);
                    return Err(Error::EngineInit(msg));
                }

                Ok(Self { lib, config, osrm })
            }
        }
    }

    impl RoutingEngine for OsrmcEngine {
        fn route(&mut self, pair: &LocationPair) -> Result<RouteSummary> {
            let lib = &self.lib;

            // SAFETY: params and response are destructed on every path
            unsafe {
                let mut err: ErrorHandle = ptr::null_mut();
                let params = (lib.route_params_construct)(&mut err);
                if let Some(msg) = lib.take_error(err) {
                    return Err(Error::RoutingError(msg));
                }

                for c in pair.coordinates() {
                    (lib.params_add_coordinate)(params, c.lon as f32, c.lat as f32, &mut err);
                    if let Some(msg) = lib.take_error(err) {
                        (lib.route_params_destruct)(params);
                        return Err(Error::RoutingError(msg));
                    }
                }

                let response = (lib.route)(self.osrm, params, &mut err);
                (lib.route_params_destruct)(params);
                if let Some(msg) = lib.take_error(err) {
                    return Err(Error::RoutingError(msg));
                }

                let distance = (lib.route_response_distance)(response, &mut err);
                (lib.route_response_destruct)(response);
                if let Some(msg) = lib.take_error(err) {
                    return Err(Error::RoutingError(msg));
                }

                Ok(RouteSummary {
                    distances: vec![distance as f64],
                })
            }
        }
    }

    impl Drop for OsrmcEngine {
        fn drop(&mut self) {
            // SAFETY: both handles were created by this library and are dropped once
            unsafe {
                (self.lib.osrm_destruct)(self.osrm);
                (self.lib.config_destruct)(self.config);
            }
        }
    }
}
