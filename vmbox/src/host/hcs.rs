//! Host Compute System backend.
//!
//! Implements [`ComputeHost`] over the platform's Host Compute System C
//! API. Each command creates a fresh operation token, and system creation
//! resolves its internal operation before returning, so the sequencing
//! guarantees the trait documents hold from the first command on.

use std::ptr;

use windows_sys::Win32::Foundation::LocalFree;
use windows_sys::Win32::System::HostComputeSystem::{
    HCS_OPERATION, HCS_SYSTEM, HcsCloseComputeSystem, HcsCloseOperation, HcsCrashComputeSystem,
    HcsCreateComputeSystem, HcsCreateOperation, HcsGetComputeSystemProperties,
    HcsModifyComputeSystem, HcsOpenComputeSystem, HcsPauseComputeSystem, HcsResumeComputeSystem,
    HcsSaveComputeSystem, HcsShutDownComputeSystem, HcsStartComputeSystem,
    HcsTerminateComputeSystem, HcsWaitForOperationResult,
};
use windows_sys::core::PWSTR;

use super::{AccessRights, ComputeHost, HostCommand, OperationToken, SystemToken};
use crate::errors::{VmboxError, VmboxResult};

const INFINITE: u32 = u32::MAX;

/// [`ComputeHost`] backed by the platform's Host Compute System service.
///
/// Stateless; the tokens carry everything. Construct once and share behind
/// an `Arc`.
#[derive(Debug, Default)]
pub struct HcsHost;

impl HcsHost {
    pub fn new() -> Self {
        Self
    }
}

fn wide(value: &str) -> Vec<u16> {
    value.encode_utf16().chain(std::iter::once(0)).collect()
}

fn optional_wide(value: Option<&str>) -> Option<Vec<u16>> {
    value.filter(|text| !text.is_empty()).map(wide)
}

fn as_system(token: SystemToken) -> HCS_SYSTEM {
    token as usize as HCS_SYSTEM
}

fn as_operation(token: OperationToken) -> HCS_OPERATION {
    token as usize as HCS_OPERATION
}

/// Copy a host-allocated result string into owned memory and free it.
unsafe fn take_result_text(raw: PWSTR) -> Option<String> {
    if raw.is_null() {
        return None;
    }
    unsafe {
        let mut len = 0usize;
        while *raw.add(len) != 0 {
            len += 1;
        }
        let text = String::from_utf16_lossy(std::slice::from_raw_parts(raw, len));
        LocalFree(raw.cast());
        Some(text)
    }
}

fn create_operation() -> VmboxResult<HCS_OPERATION> {
    let operation = unsafe { HcsCreateOperation(ptr::null(), None) };
    if operation.is_null() {
        return Err(VmboxError::ResourceExhausted(
            "host could not allocate an operation".to_string(),
        ));
    }
    Ok(operation)
}

fn wait_for(operation: HCS_OPERATION) -> VmboxResult<String> {
    let mut result_text: PWSTR = ptr::null_mut();
    let hr = unsafe { HcsWaitForOperationResult(operation, INFINITE, &mut result_text) };
    let text = unsafe { take_result_text(result_text) };
    if hr < 0 {
        return Err(VmboxError::host(hr, text));
    }
    Ok(text.unwrap_or_default())
}

impl ComputeHost for HcsHost {
    fn create_system(&self, id: &str, configuration: &str) -> VmboxResult<SystemToken> {
        let id_w = wide(id);
        let configuration_w = wide(configuration);
        let operation = create_operation()?;
        let mut system: HCS_SYSTEM = ptr::null_mut();
        let hr = unsafe {
            HcsCreateComputeSystem(
                id_w.as_ptr(),
                configuration_w.as_ptr(),
                operation,
                ptr::null(),
                &mut system,
            )
        };
        if hr < 0 {
            unsafe { HcsCloseOperation(operation) };
            return Err(VmboxError::host(hr, None));
        }
        // Creation completes asynchronously; resolve the operation before
        // handing the system token out.
        let created = wait_for(operation);
        unsafe { HcsCloseOperation(operation) };
        match created {
            Ok(_) => Ok(system as usize as SystemToken),
            Err(err) => {
                unsafe { HcsCloseComputeSystem(system) };
                Err(err)
            }
        }
    }

    fn open_system(&self, id: &str, access: AccessRights) -> VmboxResult<SystemToken> {
        let id_w = wide(id);
        let mut system: HCS_SYSTEM = ptr::null_mut();
        let hr = unsafe { HcsOpenComputeSystem(id_w.as_ptr(), access.bits(), &mut system) };
        if hr < 0 {
            return Err(VmboxError::host(hr, None));
        }
        Ok(system as usize as SystemToken)
    }

    fn issue_command(
        &self,
        system: SystemToken,
        command: HostCommand,
        options: Option<&str>,
    ) -> VmboxResult<OperationToken> {
        let operation = create_operation()?;
        let options_w = optional_wide(options);
        let options_ptr = options_w
            .as_ref()
            .map_or(ptr::null(), |text| text.as_ptr());
        let system = as_system(system);
        let hr = unsafe {
            match command {
                HostCommand::Start => HcsStartComputeSystem(system, operation, options_ptr),
                HostCommand::Shutdown => HcsShutDownComputeSystem(system, operation, options_ptr),
                HostCommand::Terminate => {
                    HcsTerminateComputeSystem(system, operation, options_ptr)
                }
                HostCommand::Crash => HcsCrashComputeSystem(system, operation, options_ptr),
                HostCommand::Pause => HcsPauseComputeSystem(system, operation, options_ptr),
                HostCommand::Resume => HcsResumeComputeSystem(system, operation, options_ptr),
                HostCommand::Save => HcsSaveComputeSystem(system, operation, options_ptr),
                HostCommand::Modify => {
                    HcsModifyComputeSystem(system, operation, options_ptr, ptr::null_mut())
                }
                HostCommand::GetProperties => {
                    HcsGetComputeSystemProperties(system, operation, options_ptr)
                }
            }
        };
        if hr < 0 {
            unsafe { HcsCloseOperation(operation) };
            return Err(VmboxError::host(hr, None));
        }
        Ok(operation as usize as OperationToken)
    }

    fn wait_operation(&self, operation: OperationToken) -> VmboxResult<String> {
        wait_for(as_operation(operation))
    }

    fn close_system(&self, system: SystemToken) {
        unsafe { HcsCloseComputeSystem(as_system(system)) };
    }

    fn close_operation(&self, operation: OperationToken) {
        unsafe { HcsCloseOperation(as_operation(operation)) };
    }
}
