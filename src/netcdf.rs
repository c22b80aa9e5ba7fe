/*!
 * [Dataset] implementation over the system NetCDF C library.
 *
 * The binding is part of the default `netcdf` feature. Without it [NetCdfFile::open] always fails
 * with [DdmError::NetCdfUnavailable](crate::DdmError::NetCdfUnavailable) and callers fall back to synthetic data.
 */

#[cfg(feature = "netcdf")]
pub use self::nc::NetCdfFile;

#[cfg(not(feature = "netcdf"))]
pub use self::unavailable::NetCdfFile;

/// Check a hyperslab request against a variable's shape.
///
/// There must be one start and one count per dimension, and the block must fit inside the
/// variable.
#[cfg_attr(not(feature = "netcdf"), allow(dead_code))]
fn check_hyperslab(
    name: &str,
    shape: &[usize],
    start: &[usize],
    count: &[usize],
) -> Result<(), String> {
    if start.len() != shape.len() || count.len() != shape.len() {
        return Err(format!(
            "hyperslab for {} needs {} indexes, got start {} and count {}",
            name,
            shape.len(),
            start.len(),
            count.len()
        ));
    }

    for (d, ((&st, &ct), &len)) in start.iter().zip(count).zip(shape).enumerate() {
        if st.checked_add(ct).map_or(true, |end| end > len) {
            return Err(format!(
                "hyperslab out of bounds for {} on dimension {}",
                name, d
            ));
        }
    }

    Ok(())
}

/**
 * Apply CF conventions packing to raw values read from a variable.
 *
 * Raw values equal to the fill or missing value become NaN. The comparison is done before scaling,
 * both attributes are in packed units. Everything else is `raw * scale + offset` when either
 * attribute is present and untouched otherwise.
 */
#[cfg_attr(not(feature = "netcdf"), allow(dead_code))]
fn unpack_cf(
    vals: &mut [f64],
    scale_factor: Option<f64>,
    add_offset: Option<f64>,
    fill_value: Option<f64>,
    missing_value: Option<f64>,
) {
    let transform = scale_factor.is_some() || add_offset.is_some();
    let scale_factor = scale_factor.unwrap_or(1.0);
    let add_offset = add_offset.unwrap_or(0.0);

    for val in vals.iter_mut() {
        if Some(*val) == fill_value || Some(*val) == missing_value {
            *val = f64::NAN;
        } else if transform {
            *val = *val * scale_factor + add_offset;
        }
    }
}

#[cfg(feature = "netcdf")]
mod nc {
    use super::{check_hyperslab, unpack_cf};
    use crate::{dataset::Dataset, error::DdmError, DdmResult};
    use libc::{c_char, c_double, c_int, c_void, size_t};
    use once_cell::sync::OnceCell;
    use std::{
        ffi::{CStr, CString},
        io::Read,
        path::Path,
        sync::{Mutex, MutexGuard},
    };

    static_assertions::assert_eq_size!(c_double, f64);

    /**
     * Handle to an open NetCDF file.
     *
     * The file is closed when this is dropped.
     */
    #[derive(Debug)]
    pub struct NetCdfFile {
        /// In memory buffer if this is from a zip file. Must outlive the handle.
        _buffer: Option<Vec<u8>>,
        /// Handle to the NetCDF file
        nc_file_id: c_int,
        /// Original file name the dataset was loaded from.
        fname: String,
    }

    macro_rules! check_error {
        ($code:expr) => {
            check_netcdf_error($code, file!(), line!())
        };
    }

    impl NetCdfFile {
        /// Open a `.nc` file, or a `.zip` archive holding a single NetCDF file.
        pub fn open<P: AsRef<Path>>(path: P) -> DdmResult<Self> {
            let p: &Path = path.as_ref();
            let fname: String = p
                .file_name()
                .map(|p| p.to_string_lossy().to_string())
                .ok_or_else(|| format!("not a file path: {}", p.display()))?;

            match p.extension() {
                Some(ext) if ext == "zip" => Self::open_zip(p, fname),
                Some(ext) if ext == "nc" => Self::open_nc(p, fname),
                Some(_) => Err(std::io::Error::from(std::io::ErrorKind::Unsupported).into()),
                None => Err(std::io::Error::from(std::io::ErrorKind::InvalidInput).into()),
            }
        }

        fn open_zip(p: &Path, fname: String) -> DdmResult<Self> {
            let path_str = CString::new(p.to_string_lossy().as_bytes())?;

            let file = std::fs::File::open(p)?;
            let mut zip = zip::ZipArchive::new(file)?;
            if zip.len() != 1 {
                return Err(format!("expected 1 file in {}, found {}", fname, zip.len()).into());
            }

            let mut nc_file = zip.by_index(0)?;
            let mut buf: Vec<u8> = Vec::with_capacity(nc_file.size() as usize + 10);
            let _size_read = nc_file.read_to_end(&mut buf)?;

            let _lock = netcdf_lock();
            let mut file_id: c_int = -1;
            unsafe {
                let status = nc_open_mem(
                    path_str.as_ptr(),
                    NC_NOWRITE,
                    buf.len(),
                    buf.as_mut_ptr() as *mut c_void,
                    &mut file_id as *mut c_int,
                );
                check_error!(status)?;
            }

            Ok(NetCdfFile {
                _buffer: Some(buf),
                nc_file_id: file_id,
                fname,
            })
        }

        fn open_nc(p: &Path, fname: String) -> DdmResult<Self> {
            let path_str = CString::new(p.to_string_lossy().as_bytes())?;

            let _lock = netcdf_lock();
            let mut file_id: c_int = -1;
            unsafe {
                let status = nc_open(path_str.as_ptr(), NC_NOWRITE, &mut file_id as *mut c_int);
                check_error!(status)?;
            }

            Ok(NetCdfFile {
                _buffer: None,
                nc_file_id: file_id,
                fname,
            })
        }

        /// Must be called with the lock held.
        fn varid(&self, name: &CStr) -> Option<c_int> {
            let mut varid: c_int = -1;
            let status =
                unsafe { nc_inq_varid(self.nc_file_id, name.as_ptr(), &mut varid as *mut c_int) };
            (status == NC_NOERR).then(|| varid)
        }

        /// Must be called with the lock held.
        fn required_varid(&self, name: &str) -> DdmResult<c_int> {
            let cname = CString::new(name)?;
            self.varid(&cname)
                .ok_or_else(|| DdmError::MissingVariable(name.to_owned()).into())
        }

        /// Must be called with the lock held. Returns `None` if the attribute isn't there.
        fn double_attribute(&self, varid: c_int, attr: &[u8]) -> DdmResult<Option<f64>> {
            let mut val: f64 = f64::NAN;
            let status = unsafe {
                nc_get_att_double(
                    self.nc_file_id,
                    varid,
                    attr.as_ptr() as *const c_char,
                    &mut val as *mut c_double,
                )
            };

            if status == NC_ENOTATT {
                return Ok(None);
            }
            check_error!(status)?;

            Ok(Some(val))
        }

        /// Must be called with the lock held.
        fn shape_of(&self, varid: c_int) -> DdmResult<Vec<usize>> {
            let h = self.nc_file_id;

            let mut ndims: c_int = 0;
            unsafe {
                let status = nc_inq_varndims(h, varid, &mut ndims as *mut c_int);
                check_error!(status)?;
            }

            let mut dimids: Vec<c_int> = vec![-1; ndims.max(0) as usize];
            let mut shape = Vec::with_capacity(dimids.len());
            unsafe {
                let status = nc_inq_vardimid(h, varid, dimids.as_mut_ptr());
                check_error!(status)?;

                for dimid in dimids {
                    let mut len: size_t = 0;
                    let status = nc_inq_dimlen(h, dimid, &mut len as *mut size_t);
                    check_error!(status)?;
                    shape.push(len);
                }
            }

            Ok(shape)
        }
    }

    impl Dataset for NetCdfFile {
        fn name(&self) -> &str {
            &self.fname
        }

        fn has_variable(&self, name: &str) -> bool {
            let cname = match CString::new(name) {
                Ok(cname) => cname,
                Err(_) => return false,
            };

            let _lock = netcdf_lock();
            self.varid(&cname).is_some()
        }

        fn variable_shape(&self, name: &str) -> DdmResult<Vec<usize>> {
            let _lock = netcdf_lock();
            let varid = self.required_varid(name)?;
            self.shape_of(varid)
        }

        fn read_hyperslab(
            &self,
            name: &str,
            start: &[usize],
            count: &[usize],
        ) -> DdmResult<Vec<f64>> {
            let lock = netcdf_lock();
            let varid = self.required_varid(name)?;

            // libnetcdf reads one start and count per dimension and fills the whole slab.
            let shape = self.shape_of(varid)?;
            check_hyperslab(name, &shape, start, count)?;

            let total: usize = count.iter().product();
            let mut vals: Vec<f64> = Vec::with_capacity(total);

            unsafe {
                let status = nc_get_vara_double(
                    self.nc_file_id,
                    varid,
                    start.as_ptr(),
                    count.as_ptr(),
                    vals.as_mut_ptr(),
                );
                check_error!(status)?;
                vals.set_len(total);
            }

            let scale_factor = self.double_attribute(varid, b"scale_factor\0")?;
            let add_offset = self.double_attribute(varid, b"add_offset\0")?;
            let fill_value = self.double_attribute(varid, b"_FillValue\0")?;
            let missing_value = self.double_attribute(varid, b"missing_value\0")?;
            drop(lock);

            unpack_cf(
                &mut vals,
                scale_factor,
                add_offset,
                fill_value,
                missing_value,
            );

            Ok(vals)
        }

        fn dimension_size(&self, name: &str) -> Option<usize> {
            let cname = CString::new(name).ok()?;

            let _lock = netcdf_lock();
            let mut dimid: c_int = -1;
            let mut len: size_t = 0;
            unsafe {
                if nc_inq_dimid(self.nc_file_id, cname.as_ptr(), &mut dimid as *mut c_int)
                    != NC_NOERR
                {
                    return None;
                }
                if nc_inq_dimlen(self.nc_file_id, dimid, &mut len as *mut size_t) != NC_NOERR {
                    return None;
                }
            }

            Some(len)
        }

        fn text_attribute(&self, variable: &str, attribute: &str) -> Option<String> {
            let cvar = CString::new(variable).ok()?;
            let cattr = CString::new(attribute).ok()?;

            let _lock = netcdf_lock();
            let varid = self.varid(&cvar)?;

            let mut xtype: c_int = -1;
            let mut len: size_t = 0;
            let mut buf: Vec<u8>;
            unsafe {
                let status = nc_inq_att(
                    self.nc_file_id,
                    varid,
                    cattr.as_ptr(),
                    &mut xtype as *mut c_int,
                    &mut len as *mut size_t,
                );
                if status != NC_NOERR || xtype != NC_CHAR {
                    return None;
                }

                buf = vec![0; len];
                let status = nc_get_att_text(
                    self.nc_file_id,
                    varid,
                    cattr.as_ptr(),
                    buf.as_mut_ptr() as *mut c_char,
                );
                if status != NC_NOERR {
                    return None;
                }
            }

            // Text attributes are not required to be nul terminated, but sometimes are.
            while buf.last() == Some(&0) {
                buf.pop();
            }

            Some(String::from_utf8_lossy(&buf).into_owned())
        }
    }

    impl Drop for NetCdfFile {
        fn drop(&mut self) {
            let _lock = netcdf_lock();

            unsafe {
                let _ = nc_close(self.nc_file_id);
            }
        }
    }

    static NETCDF_GLOBAL_LOCK: OnceCell<Mutex<()>> = OnceCell::new();

    /// The NetCDF library is not thread safe, every call into it goes through this lock.
    fn netcdf_lock() -> MutexGuard<'static, ()> {
        let mutex = NETCDF_GLOBAL_LOCK.get_or_init(|| Mutex::new(()));
        // A panic while holding the lock doesn't leave any state behind to be corrupted.
        mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    const NC_NOWRITE: c_int = 0x0000;
    const NC_NOERR: c_int = 0;
    const NC_ENOTATT: c_int = -43;
    const NC_CHAR: c_int = 2;

    fn check_netcdf_error(status_code: c_int, file: &'static str, line: u32) -> DdmResult<()> {
        unsafe {
            if status_code != NC_NOERR {
                Err(format!(
                    "{}[{}]netCDF error: {}",
                    file,
                    line,
                    std::str::from_utf8_unchecked(
                        CStr::from_ptr(nc_strerror(status_code)).to_bytes()
                    )
                )
                .into())
            } else {
                Ok(())
            }
        }
    }

    #[link(name = "netcdf")]
    extern "C" {
        fn nc_open(path: *const c_char, mode: c_int, ncidp: *mut c_int) -> c_int;
        fn nc_open_mem(
            name: *const c_char,
            mode: c_int,
            buf_size: size_t,
            buf: *mut c_void,
            ncidp: *mut c_int,
        ) -> c_int;
        fn nc_close(handle: c_int) -> c_int;

        fn nc_strerror(code: c_int) -> *const c_char;

        fn nc_inq_dimid(handle: c_int, name: *const c_char, rv: *mut c_int) -> c_int;
        fn nc_inq_dimlen(handle: c_int, dimid: c_int, rv: *mut size_t) -> c_int;
        fn nc_inq_varid(handle: c_int, name: *const c_char, varid: *mut c_int) -> c_int;
        fn nc_inq_varndims(handle: c_int, varid: c_int, ndims: *mut c_int) -> c_int;
        fn nc_inq_vardimid(handle: c_int, varid: c_int, dimids: *mut c_int) -> c_int;
        fn nc_inq_att(
            handle: c_int,
            varid: c_int,
            name: *const c_char,
            xtype: *mut c_int,
            len: *mut size_t,
        ) -> c_int;
        fn nc_get_att_text(
            handle: c_int,
            varid: c_int,
            name: *const c_char,
            val: *mut c_char,
        ) -> c_int;
        fn nc_get_att_double(
            handle: c_int,
            varid: c_int,
            name: *const c_char,
            val: *mut c_double,
        ) -> c_int;
        fn nc_get_vara_double(
            handle: c_int,
            varid: c_int,
            start: *const size_t,
            counts: *const size_t,
            vals: *mut c_double,
        ) -> c_int;
    }
}

#[cfg(not(feature = "netcdf"))]
mod unavailable {
    use crate::{dataset::Dataset, error::DdmError, DdmResult};
    use std::path::Path;

    /// Stand-in for builds without NetCDF support, it can never be opened.
    #[derive(Debug)]
    pub struct NetCdfFile {
        fname: String,
    }

    impl NetCdfFile {
        pub fn open<P: AsRef<Path>>(path: P) -> DdmResult<Self> {
            log::debug!(
                "cannot open {} without the netcdf feature",
                path.as_ref().display()
            );
            Err(DdmError::NetCdfUnavailable.into())
        }
    }

    impl Dataset for NetCdfFile {
        fn name(&self) -> &str {
            &self.fname
        }

        fn has_variable(&self, _name: &str) -> bool {
            false
        }

        fn variable_shape(&self, name: &str) -> DdmResult<Vec<usize>> {
            Err(DdmError::MissingVariable(name.to_owned()).into())
        }

        fn read_hyperslab(
            &self,
            name: &str,
            _start: &[usize],
            _count: &[usize],
        ) -> DdmResult<Vec<f64>> {
            Err(DdmError::MissingVariable(name.to_owned()).into())
        }

        fn dimension_size(&self, _name: &str) -> Option<usize> {
            None
        }

        fn text_attribute(&self, _variable: &str, _attribute: &str) -> Option<String> {
            None
        }
    }

    #[cfg(test)]
    mod test {
        use super::*;

        #[test]
        fn open_reports_missing_support() {
            let err = NetCdfFile::open("cyg01.nc").unwrap_err();
            assert_eq!(
                err.downcast_ref::<DdmError>(),
                Some(&DdmError::NetCdfUnavailable)
            );
        }
    }
}
