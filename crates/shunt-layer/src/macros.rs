//! Declaration macro for intercepted symbols.

/// `CStr` for a symbol name spelled as a NUL-terminated literal.
pub(crate) const fn symbol_name(nul_terminated: &'static str) -> &'static std::ffi::CStr {
    match std::ffi::CStr::from_bytes_with_nul(nul_terminated.as_bytes()) {
        Ok(name) => name,
        Err(_) => panic!("symbol name must end with exactly one NUL"),
    }
}

/// Declare intercepted libc functions.
///
/// ```ignore
/// intercept! {
///     fn malloc(size: size_t) -> *mut c_void as MALLOC / IT_MALLOC => malloc_body;
/// }
/// ```
///
/// For each entry this expands to:
/// - a compile-time check that the signature matches `libc::<name>`
/// - `static MALLOC: Hook<..>` holding the original's binding
/// - on Linux, an exported `#[no_mangle]` definition of `malloc`
/// - on Darwin, the `__DATA,__interpose` record `IT_MALLOC`
///
/// Every route ends in `malloc_body` with the same arguments.
macro_rules! intercept {
    ($(
        $(#[cfg($cfg:meta)])?
        fn $symbol:ident($($arg:ident: $ty:ty),* $(,)?) -> $ret:ty
            as $hook:ident / $entry:ident => $body:path;
    )*) => {$(
        $(#[cfg($cfg)])?
        const _: unsafe extern "C" fn($($ty),*) -> $ret = libc::$symbol;

        $(#[cfg($cfg)])?
        pub static $hook: shunt_core::Hook<unsafe extern "C" fn($($ty),*) -> $ret> = {
            let hook = shunt_core::Hook::new($crate::macros::symbol_name(
                concat!(stringify!($symbol), "\0"),
            ));
            #[cfg(target_vendor = "apple")]
            let hook = hook.with_entry(&$entry);
            hook
        };

        #[cfg(not(target_vendor = "apple"))]
        $(#[cfg($cfg)])?
        #[no_mangle]
        pub unsafe extern "C" fn $symbol($($arg: $ty),*) -> $ret {
            $body($($arg),*)
        }

        #[cfg(target_vendor = "apple")]
        $(#[cfg($cfg)])?
        #[link_section = "__DATA,__interpose"]
        #[used]
        static $entry: shunt_core::InterposeEntry = {
            unsafe extern "C" fn replacement($($arg: $ty),*) -> $ret {
                $body($($arg),*)
            }
            shunt_core::InterposeEntry {
                new_func: replacement as *const (),
                old_func: libc::$symbol as *const (),
            }
        };
    )*};
}
