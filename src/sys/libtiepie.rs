use std::ffi::CStr;
use libc::{c_char, c_double, c_float};

use crate::{Error, Result};
use crate::config::{ClockSource, Coupling, TriggerKind, TriggerSource};
use crate::params::{self, MeasureModes, ScopeStatus};
use super::Handle;

type Bool8 = u8;
type RawHandle = u32;

const BOOL8_FALSE: Bool8 = 0;
const BOOL8_TRUE: Bool8 = 1;
const LIBTIEPIE_HANDLE_INVALID: RawHandle = 0;

#[link(name = "tiepie")]
extern "C" {
    fn LibInit();
    fn LibExit();
    fn LibGetVersion() -> u64;
    fn LibGetLastStatus() -> i32;
    fn LibGetLastStatusStr() -> *const c_char;

    fn NetSetAutoDetectEnabled(enable: Bool8) -> Bool8;
    fn LstUpdate();
    fn LstGetCount() -> u32;
    fn LstDevCanOpen(id_kind: u32, id: u32, device_type: u32) -> Bool8;
    fn LstOpenOscilloscope(id_kind: u32, id: u32) -> RawHandle;

    fn ObjClose(handle: RawHandle) -> Bool8;
    fn ObjIsRemoved(handle: RawHandle) -> Bool8;
    fn DevGetName(handle: RawHandle, buffer: *mut c_char, length: u32) -> u32;
    fn DevGetSerialNumber(handle: RawHandle) -> u32;
    fn DevTrInSetEnabled(handle: RawHandle, input: u16, enable: Bool8) -> Bool8;
    fn DevTrInSetKind(handle: RawHandle, input: u16, kind: u64) -> u64;

    fn ScpGetMeasureModes(handle: RawHandle) -> u32;
    fn ScpSetMeasureMode(handle: RawHandle, mode: u32) -> u32;
    fn ScpGetChannelCount(handle: RawHandle) -> u16;
    fn ScpSetSampleFrequency(handle: RawHandle, frequency: c_double) -> c_double;
    fn ScpSetRecordLength(handle: RawHandle, length: u64) -> u64;
    fn ScpSetPreSampleRatio(handle: RawHandle, ratio: c_double) -> c_double;
    fn ScpSetResolution(handle: RawHandle, bits: u8) -> u8;
    fn ScpSetTriggerTimeOut(handle: RawHandle, seconds: c_double) -> c_double;
    fn ScpSetClockSource(handle: RawHandle, source: u32) -> u32;
    fn ScpGetClockSourceFrequencies(handle: RawHandle, list: *mut c_double, length: u32) -> u32;

    fn ScpChSetEnabled(handle: RawHandle, ch: u16, enable: Bool8) -> Bool8;
    fn ScpChSetRange(handle: RawHandle, ch: u16, range: c_double) -> c_double;
    fn ScpChSetCoupling(handle: RawHandle, ch: u16, coupling: u64) -> u64;
    fn ScpChTrSetEnabled(handle: RawHandle, ch: u16, enable: Bool8) -> Bool8;
    fn ScpChTrSetKind(handle: RawHandle, ch: u16, kind: u64) -> u64;
    fn ScpChTrSetLevelMode(handle: RawHandle, ch: u16, mode: u32) -> u32;
    fn ScpChTrSetLevel(handle: RawHandle, ch: u16, index: u32, level: c_double) -> c_double;
    fn ScpChTrSetHysteresis(handle: RawHandle, ch: u16, index: u32, hysteresis: c_double)
        -> c_double;

    fn ScpStart(handle: RawHandle) -> Bool8;
    fn ScpIsDataReady(handle: RawHandle) -> Bool8;
    fn ScpGetData(handle: RawHandle, buffers: *mut *mut c_float, channel_count: u16,
        start: u64, length: u64) -> u64;
}

/// Checks the status of the last library call; errors are returned, warnings are logged.
fn check_last_status() -> Result<()> {
    unsafe {
        let status = LibGetLastStatus();
        if status == 0 {
            return Ok(())
        }
        let message = CStr::from_ptr(LibGetLastStatusStr()).to_string_lossy().into_owned();
        if status < 0 {
            Err(Error::Library { status, message })
        } else {
            log::warn!("libtiepie status {}: {}", status, message);
            Ok(())
        }
    }
}

macro_rules! call {
    ($call:expr) => {{
        // SAFETY: Library is initialized for the lifetime of `LibTiePie`, and every pointer
        // argument outlives the call.
        let value = unsafe { $call };
        check_last_status()?;
        value
    }}
}

fn bool8(value: bool) -> Bool8 {
    if value { BOOL8_TRUE } else { BOOL8_FALSE }
}

#[derive(Debug)]
pub struct LibTiePie {
    _private: (),
}

impl LibTiePie {
    pub fn new() -> Result<LibTiePie> {
        unsafe { LibInit() };
        check_last_status()?;
        log::debug!("libtiepie initialized");
        Ok(LibTiePie { _private: () })
    }
}

impl Drop for LibTiePie {
    fn drop(&mut self) {
        unsafe { LibExit() };
        log::debug!("libtiepie exited");
    }
}

impl super::Driver for LibTiePie {
    fn version(&self) -> String {
        let version = unsafe { LibGetVersion() };
        format!("{}.{}.{}.{}",
            (version >> 48) & 0xffff, (version >> 32) & 0xffff,
            (version >> 16) & 0xffff, version & 0xffff)
    }

    fn set_network_auto_detect(&mut self, enabled: bool) -> Result<()> {
        call!(NetSetAutoDetectEnabled(bool8(enabled)));
        Ok(())
    }

    fn update_device_list(&mut self) -> Result<()> {
        call!(LstUpdate());
        Ok(())
    }

    fn device_count(&self) -> Result<u32> {
        Ok(call!(LstGetCount()))
    }

    fn can_open_oscilloscope(&self, index: u32) -> Result<bool> {
        Ok(call!(LstDevCanOpen(params::IDKIND_INDEX, index, params::DEVICETYPE_OSCILLOSCOPE))
            != BOOL8_FALSE)
    }

    fn open_oscilloscope(&mut self, index: u32) -> Result<Handle> {
        match call!(LstOpenOscilloscope(params::IDKIND_INDEX, index)) {
            LIBTIEPIE_HANDLE_INVALID => Err(Error::NotFound),
            handle => Ok(Handle(handle)),
        }
    }

    fn close(&mut self, handle: Handle) -> Result<()> {
        call!(ObjClose(handle.0));
        Ok(())
    }

    fn name(&self, handle: Handle) -> Result<String> {
        let length = call!(DevGetName(handle.0, std::ptr::null_mut(), 0));
        let mut buffer = vec![0u8; length as usize + 1];
        call!(DevGetName(handle.0, buffer.as_mut_ptr() as *mut c_char, buffer.len() as u32));
        buffer.truncate(length as usize);
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }

    fn serial_number(&self, handle: Handle) -> Result<u32> {
        Ok(call!(DevGetSerialNumber(handle.0)))
    }

    fn measure_modes(&self, handle: Handle) -> Result<MeasureModes> {
        Ok(MeasureModes::from_bits_retain(call!(ScpGetMeasureModes(handle.0))))
    }

    fn channel_count(&self, handle: Handle) -> Result<u16> {
        Ok(call!(ScpGetChannelCount(handle.0)))
    }

    fn clock_source_frequencies(&self, handle: Handle) -> Result<Vec<f64>> {
        let length = call!(ScpGetClockSourceFrequencies(handle.0, std::ptr::null_mut(), 0));
        let mut frequencies = vec![0.0; length as usize];
        let length = call!(ScpGetClockSourceFrequencies(
            handle.0, frequencies.as_mut_ptr(), frequencies.len() as u32));
        frequencies.truncate(length as usize);
        Ok(frequencies)
    }

    fn set_measure_mode(&mut self, handle: Handle, mode: MeasureModes) -> Result<()> {
        call!(ScpSetMeasureMode(handle.0, mode.bits()));
        Ok(())
    }

    fn set_sample_frequency(&mut self, handle: Handle, frequency: f64) -> Result<f64> {
        Ok(call!(ScpSetSampleFrequency(handle.0, frequency)))
    }

    fn set_record_length(&mut self, handle: Handle, length: u64) -> Result<u64> {
        Ok(call!(ScpSetRecordLength(handle.0, length)))
    }

    fn set_pre_sample_ratio(&mut self, handle: Handle, ratio: f64) -> Result<f64> {
        Ok(call!(ScpSetPreSampleRatio(handle.0, ratio)))
    }

    fn set_resolution(&mut self, handle: Handle, bits: u8) -> Result<u8> {
        Ok(call!(ScpSetResolution(handle.0, bits)))
    }

    fn set_trigger_timeout(&mut self, handle: Handle, seconds: f64) -> Result<f64> {
        Ok(call!(ScpSetTriggerTimeOut(handle.0, seconds)))
    }

    fn set_clock_source(&mut self, handle: Handle, source: ClockSource) -> Result<()> {
        call!(ScpSetClockSource(handle.0, source.libtiepie_code()));
        Ok(())
    }

    fn set_channel_enabled(&mut self, handle: Handle, channel: u16, enabled: bool) -> Result<()> {
        call!(ScpChSetEnabled(handle.0, channel, bool8(enabled)));
        Ok(())
    }

    fn set_channel_range(&mut self, handle: Handle, channel: u16, range: f64) -> Result<f64> {
        Ok(call!(ScpChSetRange(handle.0, channel, range)))
    }

    fn set_channel_coupling(&mut self, handle: Handle, channel: u16, coupling: Coupling)
            -> Result<()> {
        call!(ScpChSetCoupling(handle.0, channel, coupling.libtiepie_code()));
        Ok(())
    }

    fn set_trigger_enabled(&mut self, handle: Handle, source: TriggerSource, enabled: bool)
            -> Result<()> {
        match source {
            TriggerSource::Channel(channel) =>
                call!(ScpChTrSetEnabled(handle.0, channel, bool8(enabled))),
            TriggerSource::External(input) =>
                call!(DevTrInSetEnabled(handle.0, input, bool8(enabled))),
        };
        Ok(())
    }

    fn set_trigger_kind(&mut self, handle: Handle, source: TriggerSource, kind: TriggerKind)
            -> Result<()> {
        match source {
            TriggerSource::Channel(channel) =>
                call!(ScpChTrSetKind(handle.0, channel, kind.libtiepie_code())),
            TriggerSource::External(input) =>
                call!(DevTrInSetKind(handle.0, input, kind.libtiepie_code())),
        };
        Ok(())
    }

    fn set_trigger_level(&mut self, handle: Handle, channel: u16, level: f64) -> Result<f64> {
        call!(ScpChTrSetLevelMode(handle.0, channel, params::TLM_ABSOLUTE));
        Ok(call!(ScpChTrSetLevel(handle.0, channel, 0, level)))
    }

    fn set_trigger_hysteresis(&mut self, handle: Handle, channel: u16, hysteresis: f64)
            -> Result<f64> {
        Ok(call!(ScpChTrSetHysteresis(handle.0, channel, 0, hysteresis)))
    }

    fn start(&mut self, handle: Handle) -> Result<()> {
        call!(ScpStart(handle.0));
        Ok(())
    }

    fn status(&self, handle: Handle) -> Result<ScopeStatus> {
        let mut status = ScopeStatus::empty();
        if unsafe { ObjIsRemoved(handle.0) } != BOOL8_FALSE {
            status.insert(ScopeStatus::Removed);
        } else if call!(ScpIsDataReady(handle.0)) != BOOL8_FALSE {
            status.insert(ScopeStatus::DataReady);
        }
        Ok(status)
    }

    fn get_data(&mut self, handle: Handle, buffers: &mut [Option<&mut [f32]>], start: u64)
            -> Result<u64> {
        let length = buffers.iter()
            .flatten()
            .map(|buffer| buffer.len())
            .min()
            .unwrap_or(0);
        let mut pointers = buffers.iter_mut()
            .map(|buffer| match buffer {
                Some(buffer) => buffer.as_mut_ptr(),
                None => std::ptr::null_mut(),
            })
            .collect::<Vec<*mut c_float>>();
        Ok(call!(ScpGetData(handle.0, pointers.as_mut_ptr(), pointers.len() as u16,
            start, length as u64)))
    }
}
