use lazy_static::lazy_static;
use std::cmp;
use vst3_sys::vst::TChar;
use widestring::U16String;

use crate::wrapper::util::hash_param_id;

/// The wrapper exposes the plugin's programs as a single list parameter with this ID.
pub const PROGRAM_PARAM_ID: &str = "program";
lazy_static! {
    pub static ref PROGRAM_PARAM_HASH: u32 = hash_param_id(PROGRAM_PARAM_ID);
}

/// The same as [`strlcpy()`][crate::wrapper::util::strlcpy()], but for VST3's UTF-16 strings.
pub fn u16strlcpy(dest: &mut [TChar], src: &str) {
    if dest.is_empty() {
        return;
    }

    let src_utf16 = U16String::from_str(src).into_vec();

    // Make sure there's always room for a null terminator
    let copy_len = cmp::min(dest.len() - 1, src_utf16.len());
    for (dest, &src) in dest.iter_mut().zip(&src_utf16[..copy_len]) {
        *dest = src as TChar;
    }
    dest[copy_len] = 0;
}

/// Send+Sync wrapper for these interface pointers.
#[repr(transparent)]
pub struct VstPtr<T: vst3_sys::ComInterface + ?Sized> {
    ptr: vst3_sys::VstPtr<T>,
}

impl<T: vst3_sys::ComInterface + ?Sized> std::ops::Deref for VstPtr<T> {
    type Target = vst3_sys::VstPtr<T>;

    fn deref(&self) -> &Self::Target {
        &self.ptr
    }
}

impl<T: vst3_sys::ComInterface + ?Sized> From<vst3_sys::VstPtr<T>> for VstPtr<T> {
    fn from(ptr: vst3_sys::VstPtr<T>) -> Self {
        Self { ptr }
    }
}

/// SAFETY: Sharing these pointers across thread is s safe as they have internal atomic reference
/// counting, so as long as a `VstPtr<T>` handle exists the object will stay alive.
unsafe impl<T: vst3_sys::ComInterface + ?Sized> Send for VstPtr<T> {}
unsafe impl<T: vst3_sys::ComInterface + ?Sized> Sync for VstPtr<T> {}
