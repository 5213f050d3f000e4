// src/collector/windows.rs
//! Native transport over the inbox `stornvme` driver.
//!
//! Controllers are addressed through SCSI adapter slots (`\\.\ScsiN:`) with
//! NVMe protocol-specific storage queries; serial numbers of OS disks come
//! from `\\.\PhysicalDriveN`.

use std::ffi::c_void;
use std::mem::{offset_of, size_of, zeroed};
use std::ptr::{null, null_mut};

use windows_sys::Win32::{
    Foundation::{CloseHandle, GENERIC_READ, GENERIC_WRITE, HANDLE, INVALID_HANDLE_VALUE},
    Storage::FileSystem::{CreateFileW, FILE_SHARE_READ, FILE_SHARE_WRITE, OPEN_EXISTING},
    System::IO::DeviceIoControl,
    System::Ioctl::{
        IOCTL_STORAGE_QUERY_PROPERTY, NVMeDataTypeIdentify, NVMeDataTypeLogPage,
        PropertyStandardQuery, ProtocolTypeNvme, STORAGE_DEVICE_DESCRIPTOR,
        STORAGE_PROPERTY_QUERY, STORAGE_PROTOCOL_DATA_DESCRIPTOR, STORAGE_PROTOCOL_SPECIFIC_DATA,
        StorageAdapterProtocolSpecificProperty, StorageDeviceProperty,
    },
};

use crate::collector::health::HEALTH_LOG_LEN;
use crate::collector::identity::IDENTIFY_LEN;
use crate::collector::transport::{DriveEnumerator, NvmeHandle, NvmeTransport, StorageDescriptor};
use crate::error::{NvmeError, Result};

const CNS_SPECIFIC_NAMESPACE: u32 = 0x00;
const CNS_CONTROLLER: u32 = 0x01;
const LOG_PAGE_HEALTH_INFO: u32 = 0x02;

/// Physical drives probed when listing storage devices.
const MAX_PHYSICAL_DRIVES: u32 = 32;

/// Handle closed on drop.
struct DeviceHandle(HANDLE);

impl Drop for DeviceHandle {
    fn drop(&mut self) {
        if self.0 != INVALID_HANDLE_VALUE {
            unsafe { CloseHandle(self.0) };
        }
    }
}

fn open_device(path: &str, access: u32) -> std::io::Result<DeviceHandle> {
    let wide_path: Vec<u16> = path.encode_utf16().chain(std::iter::once(0)).collect();
    let handle = unsafe {
        CreateFileW(
            wide_path.as_ptr(),
            access,
            FILE_SHARE_READ | FILE_SHARE_WRITE,
            null(),
            OPEN_EXISTING,
            0,
            null_mut(),
        )
    };
    if handle == INVALID_HANDLE_VALUE {
        Err(std::io::Error::last_os_error())
    } else {
        Ok(DeviceHandle(handle))
    }
}

/// Windows NVMe transport.
#[derive(Debug, Clone, Copy, Default)]
pub struct WindowsTransport;

impl WindowsTransport {
    pub fn new() -> Self {
        Self
    }
}

impl NvmeTransport for WindowsTransport {
    fn open(&self, slot: u32) -> Result<Box<dyn NvmeHandle>> {
        let path = format!("\\\\.\\Scsi{slot}:");
        let handle = open_device(&path, GENERIC_READ | GENERIC_WRITE).map_err(|e| NvmeError::Open {
            slot,
            reason: e.to_string(),
        })?;
        Ok(Box::new(WindowsNvmeHandle { handle }))
    }
}

struct WindowsNvmeHandle {
    handle: DeviceHandle,
}

impl WindowsNvmeHandle {
    /// Issues an adapter protocol-specific query and returns its payload.
    fn query(
        &self,
        command: &'static str,
        data_type: i32,
        request: u32,
        sub_request: u32,
        length: usize,
    ) -> Result<Vec<u8>> {
        let header = offset_of!(STORAGE_PROPERTY_QUERY, AdditionalParameters);
        let protocol_len = size_of::<STORAGE_PROTOCOL_SPECIFIC_DATA>();
        let mut buffer = vec![0u8; header + protocol_len + length];

        let mut query: STORAGE_PROPERTY_QUERY = unsafe { zeroed() };
        query.PropertyId = StorageAdapterProtocolSpecificProperty;
        query.QueryType = PropertyStandardQuery;

        let mut protocol: STORAGE_PROTOCOL_SPECIFIC_DATA = unsafe { zeroed() };
        protocol.ProtocolType = ProtocolTypeNvme;
        protocol.DataType = data_type as u32;
        protocol.ProtocolDataRequestValue = request;
        protocol.ProtocolDataRequestSubValue = sub_request;
        protocol.ProtocolDataOffset = protocol_len as u32;
        protocol.ProtocolDataLength = length as u32;

        unsafe {
            std::ptr::copy_nonoverlapping(
                &query as *const STORAGE_PROPERTY_QUERY as *const u8,
                buffer.as_mut_ptr(),
                header,
            );
            std::ptr::write_unaligned(
                buffer.as_mut_ptr().add(header) as *mut STORAGE_PROTOCOL_SPECIFIC_DATA,
                protocol,
            );
        }

        let mut returned: u32 = 0;
        let ok = unsafe {
            DeviceIoControl(
                self.handle.0,
                IOCTL_STORAGE_QUERY_PROPERTY,
                buffer.as_ptr() as *const c_void,
                buffer.len() as u32,
                buffer.as_mut_ptr() as *mut c_void,
                buffer.len() as u32,
                &mut returned,
                null_mut(),
            )
        };
        if ok == 0 {
            return Err(NvmeError::command(command, std::io::Error::last_os_error()));
        }

        let descriptor_len = size_of::<STORAGE_PROTOCOL_DATA_DESCRIPTOR>();
        if (returned as usize) < descriptor_len {
            return Err(NvmeError::Malformed {
                structure: "protocol data descriptor",
                expected: descriptor_len,
                actual: returned as usize,
            });
        }

        let descriptor: STORAGE_PROTOCOL_DATA_DESCRIPTOR = unsafe {
            std::ptr::read_unaligned(buffer.as_ptr() as *const STORAGE_PROTOCOL_DATA_DESCRIPTOR)
        };
        let data = &descriptor.ProtocolSpecificData;
        let start = offset_of!(STORAGE_PROTOCOL_DATA_DESCRIPTOR, ProtocolSpecificData)
            + data.ProtocolDataOffset as usize;
        let end = start + data.ProtocolDataLength as usize;
        if data.ProtocolDataLength as usize != length || end > buffer.len() {
            return Err(NvmeError::Inconsistent {
                structure: command,
                reason: format!(
                    "payload {}+{} does not fit {} bytes",
                    data.ProtocolDataOffset,
                    data.ProtocolDataLength,
                    buffer.len()
                ),
            });
        }

        Ok(buffer[start..end].to_vec())
    }
}

impl NvmeHandle for WindowsNvmeHandle {
    fn identify_controller(&mut self) -> Result<Vec<u8>> {
        self.query(
            "identify controller",
            NVMeDataTypeIdentify,
            CNS_CONTROLLER,
            0,
            IDENTIFY_LEN,
        )
    }

    fn identify_namespace(&mut self, nsid: u32) -> Result<Vec<u8>> {
        self.query(
            "identify namespace",
            NVMeDataTypeIdentify,
            CNS_SPECIFIC_NAMESPACE,
            nsid,
            IDENTIFY_LEN,
        )
    }

    fn health_log(&mut self) -> Result<Vec<u8>> {
        self.query(
            "get log page",
            NVMeDataTypeLogPage,
            LOG_PAGE_HEALTH_INFO,
            0,
            HEALTH_LOG_LEN,
        )
    }
}

impl DriveEnumerator for WindowsTransport {
    fn storage_devices(&self) -> Result<Vec<StorageDescriptor>> {
        let mut devices = Vec::new();
        for index in 0..MAX_PHYSICAL_DRIVES {
            let path = format!("\\\\.\\PhysicalDrive{index}");
            // No access rights are needed for a device property query
            let Ok(handle) = open_device(&path, 0) else {
                continue;
            };
            match physical_drive_serial(&handle) {
                Some(serial) => devices.push(StorageDescriptor {
                    serial,
                    logical_index: index,
                }),
                None => tracing::debug!("No serial number for {}", path),
            }
        }
        Ok(devices)
    }
}

fn physical_drive_serial(handle: &DeviceHandle) -> Option<String> {
    let mut query: STORAGE_PROPERTY_QUERY = unsafe { zeroed() };
    query.PropertyId = StorageDeviceProperty;
    query.QueryType = PropertyStandardQuery;

    let mut buffer = vec![0u8; 1024];
    let mut returned: u32 = 0;
    let ok = unsafe {
        DeviceIoControl(
            handle.0,
            IOCTL_STORAGE_QUERY_PROPERTY,
            &query as *const _ as *const c_void,
            size_of::<STORAGE_PROPERTY_QUERY>() as u32,
            buffer.as_mut_ptr() as *mut c_void,
            buffer.len() as u32,
            &mut returned,
            null_mut(),
        )
    };
    if ok == 0 || (returned as usize) < size_of::<STORAGE_DEVICE_DESCRIPTOR>() {
        return None;
    }

    let descriptor: STORAGE_DEVICE_DESCRIPTOR =
        unsafe { std::ptr::read_unaligned(buffer.as_ptr() as *const STORAGE_DEVICE_DESCRIPTOR) };
    let offset = descriptor.SerialNumberOffset as usize;
    if offset == 0 || offset >= returned as usize {
        return None;
    }

    let raw = &buffer[offset..returned as usize];
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    let serial = String::from_utf8_lossy(&raw[..end]).trim().to_string();
    (!serial.is_empty()).then_some(serial)
}
