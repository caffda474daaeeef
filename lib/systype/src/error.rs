//! Error codes shared across the kernel.

use strum::FromRepr;

/// Type alias for syscall results. A syscall returns an `usize` if successful.
pub type SyscallResult = Result<usize, SysError>;
/// Type alias for results of general kernel functions.
pub type SysResult<T> = Result<T, SysError>;

/// Linux-compatible error codes defined in `errno.h`.
// See "asm-generic/errno-base.h" and "asm-generic/errno.h".
#[derive(FromRepr, Clone, Copy, Debug, Eq, PartialEq)]
#[repr(i32)]
pub enum SysError {
    /// Operation not permitted
    EPERM = 1,
    /// No such process
    ESRCH = 3,
    /// Interrupted system call
    EINTR = 4,
    /// I/O error
    EIO = 5,
    /// Argument list too long
    E2BIG = 7,
    /// Try again
    EAGAIN = 11,
    /// Out of memory
    ENOMEM = 12,
    /// Permission denied
    EACCES = 13,
    /// Bad address
    EFAULT = 14,
    /// Device or resource busy
    EBUSY = 16,
    /// File exists
    EEXIST = 17,
    /// Invalid argument
    EINVAL = 22,
    /// No space left on device
    ENOSPC = 28,
    /// File name too long
    ENAMETOOLONG = 36,
    /// Invalid system call number
    ENOSYS = 38,
}

impl SysError {
    /// Returns the error description.
    pub const fn as_str(&self) -> &'static str {
        use self::SysError::*;
        match self {
            EPERM => "Operation not permitted",
            ESRCH => "No such process",
            EINTR => "Interrupted system call",
            EIO => "I/O error",
            E2BIG => "Argument list too long",
            EAGAIN => "Try again",
            ENOMEM => "Out of memory",
            EACCES => "Permission denied",
            EFAULT => "Bad address",
            EBUSY => "Device or resource busy",
            EEXIST => "File exists",
            EINVAL => "Invalid argument",
            ENOSPC => "No space left on device",
            ENAMETOOLONG => "File name too long",
            ENOSYS => "Invalid system call number",
        }
    }

    /// Returns the error for a raw code.
    pub const fn from_i32(value: i32) -> Self {
        Self::from_repr(value).unwrap()
    }

    /// Returns the error code value in `i32`.
    pub const fn code(self) -> i32 {
        self as i32
    }
}
