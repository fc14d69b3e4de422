use clap_sys::stream::{clap_istream, clap_ostream};
use std::ops::Deref;
use std::os::raw::c_void;

/// Call a function from one of CLAP's vtables, using `obj=>function(args)` syntax. `clap-sys`
/// models every function pointer as an `Option`, but a host handing out a null function is a host
/// bug, so this panics with the struct and function name in that case.
macro_rules! clap_call {
    { $obj_ptr:expr=>$function_name:ident($($args:expr),* $(, )?) } => {
        match (*$obj_ptr).$function_name {
            Some(function_ptr) => function_ptr($($args),*),
            None => panic!(
                "'{}::{}' is a null pointer",
                $crate::wrapper::clap::util::type_name_of_ptr($obj_ptr),
                stringify!($function_name)
            ),
        }
    }
}

/// [`clap_call!()`] in an `unsafe` block.
macro_rules! unsafe_clap_call {
    { $($args:tt)* } => {
        unsafe { $crate::wrapper::clap::util::clap_call! { $($args)* } }
    }
}

pub(crate) use clap_call;
pub(crate) use unsafe_clap_call;

#[must_use]
pub fn type_name_of_ptr<T: ?Sized>(_ptr: *const T) -> &'static str {
    std::any::type_name::<T>()
}

/// A host provided object, such as the host's `clap_host_params` extension, that can be shared
/// between the main thread and the audio thread.
pub struct ClapPtr<T> {
    inner: *const T,
}

unsafe impl<T> Send for ClapPtr<T> {}
unsafe impl<T> Sync for ClapPtr<T> {}

impl<T> ClapPtr<T> {
    /// # Safety
    ///
    /// `ptr` must stay valid for as long as this object exists.
    pub unsafe fn new(ptr: *const T) -> Self {
        Self { inner: ptr }
    }
}

impl<T> Deref for ClapPtr<T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.inner }
    }
}

/// Write a state blob to the host's stream, prefixed with its length as a little-endian `u64`.
/// CLAP streams don't have a known length, so this is how [`read_state_chunk()`] knows where the
/// data ends.
pub fn write_state_chunk(stream: &clap_ostream, data: &[u8]) -> bool {
    write_all(stream, &(data.len() as u64).to_le_bytes()) && write_all(stream, data)
}

/// Read a blob written by [`write_state_chunk()`]. Returns `None` if the stream ended early or
/// returned an error.
pub fn read_state_chunk(stream: &clap_istream) -> Option<Vec<u8>> {
    let mut length = [0u8; 8];
    if !read_exact(stream, &mut length) {
        return None;
    }

    let mut data = vec![0u8; u64::from_le_bytes(length) as usize];
    read_exact(stream, &mut data).then_some(data)
}

/// Streams may only accept part of a write, so this loops until everything has been written.
fn write_all(stream: &clap_ostream, mut data: &[u8]) -> bool {
    while !data.is_empty() {
        let written = unsafe_clap_call! {
            stream=>write(stream, data.as_ptr() as *const c_void, data.len() as u64)
        };
        if written <= 0 {
            return false;
        }

        data = &data[(written as usize).min(data.len())..];
    }

    true
}

fn read_exact(stream: &clap_istream, mut buffer: &mut [u8]) -> bool {
    while !buffer.is_empty() {
        let read = unsafe_clap_call! {
            stream=>read(stream, buffer.as_mut_ptr() as *mut c_void, buffer.len() as u64)
        };
        if read <= 0 {
            return false;
        }

        let remaining = std::mem::take(&mut buffer);
        let read = (read as usize).min(remaining.len());
        buffer = &mut remaining[read..];
    }

    true
}
