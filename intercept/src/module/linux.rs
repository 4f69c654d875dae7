use crate::types::{MAIN_PROGRAM, ModuleInfo};
use core::ffi::{CStr, c_int, c_void};

fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

unsafe extern "C" fn push_module(
    info: *mut libc::dl_phdr_info,
    _size: libc::size_t,
    modules: *mut c_void,
) -> c_int {
    let modules = unsafe { &mut *(modules as *mut Vec<ModuleInfo>) };
    let info = unsafe { &*info };
    let mut path = String::new();
    if !info.dlpi_name.is_null() {
        path = unsafe { CStr::from_ptr(info.dlpi_name) }
            .to_string_lossy()
            .into_owned();
    }
    if path.is_empty() {
        // the main executable is listed without a name
        path = MAIN_PROGRAM.to_string();
    }
    modules.push(ModuleInfo {
        path,
        base_address: info.dlpi_addr as usize,
    });
    0
}

/// Every loaded object via `dl_iterate_phdr`, in load order.
///
/// The main executable comes first; preloaded libraries follow it and precede
/// the host's ordinary dependencies.
pub fn enumerate_modules() -> Vec<ModuleInfo> {
    let mut modules: Vec<ModuleInfo> = Vec::new();
    unsafe {
        libc::dl_iterate_phdr(Some(push_module), &mut modules as *mut _ as *mut c_void);
    }
    modules
}

/// Name of the loaded object containing `address`, via `dladdr`.
pub fn module_for_address(address: usize) -> Option<String> {
    unsafe {
        let mut info: libc::Dl_info = core::mem::zeroed();
        if libc::dladdr(address as *const c_void, &mut info) == 0 {
            return None;
        }
        if info.dli_fname.is_null() {
            return None;
        }
        let path = CStr::from_ptr(info.dli_fname).to_string_lossy();
        Some(basename(&path).to_string())
    }
}
