use std::env::set_var;
use std::ffi::OsStr;
use std::fs;
use std::process::Stdio;

use anyhow::{anyhow, Result};
use clap::{arg, command, ArgAction};
use execute::Execute;
use fork::{fork, Fork};
use fuser::MountOption;
use log::*;
use nix::sys::signal;
use retry::delay::Fixed;
use retry::{retry_with_index, OperationResult};

use pfs::core::utils::init_logs;
use pfs::core::Config;
use pfs::fuse_adapter::PfsFuse;
use pfs::{Facade, DEVICE_FILE, FORCE_FORMAT, MOUNT_POINT};
use storage::MmapBacking;

fn main() -> Result<()> {
    let matches = command!() // requires `cargo` feature
        .arg(arg!([mountpoint] "Optional mountpoint to mount on").default_value("tests/mnt"))
        .arg(
            arg!(-f --front "Keep daemon running in front")
                .action(ArgAction::SetTrue)
                .required(false),
        )
        .arg(
            arg!(--format "Force-create a fresh persistent image")
                .action(ArgAction::SetTrue)
                .required(false),
        )
        .arg(
            arg!(-r --read_only "Mount as read only filesystem")
                .action(ArgAction::SetTrue)
                .required(false),
        )
        .arg(
            arg!(-v --verbose "Print more debug information, or set `RUST_LOG=debug`")
                .action(ArgAction::SetTrue)
                .required(false),
        )
        .arg(
            arg!(-d --device <FILE> "Device path (persistent image file)")
                .required(false)
                .default_value("pfs.img"),
        )
        .arg(
            arg!(-s --size <BYTES> "Data-section capacity in bytes")
                .required(false)
                .default_value("268435456"),
        )
        .get_matches();

    if matches.get_flag("verbose") {
        set_var("RUST_LOG", "debug");
    }
    init_logs();

    let mountpoint = matches.get_one::<String>("mountpoint").unwrap();
    let device = matches.get_one::<String>("device").unwrap();
    let data_capacity: u64 = matches
        .get_one::<String>("size")
        .unwrap()
        .parse()
        .map_err(|e| anyhow!("bad --size value: {e}"))?;
    let path_mountpoint = fs::canonicalize(mountpoint)?;
    let abspath_mountpoint = path_mountpoint.to_str().unwrap();
    info!("Device: {}", device);
    DEVICE_FILE.write().replace(device.clone());
    MOUNT_POINT.write().replace(abspath_mountpoint.to_string());
    FORCE_FORMAT.write().replace(matches.get_flag("format"));

    macro_rules! umount {
        () => {{
            use log::*;
            let mp = MOUNT_POINT.read().clone().unwrap();
            info!("Unmounting {}", mp);
            let mut command = execute::command_args!("fusermount", "-u", mp);
            command.stdout(Stdio::piped());
            let output = command.execute_output().unwrap();
            info!("fusermount output: {}", String::from_utf8(output.stdout).unwrap());
        }};
    }

    pub extern "C" fn signal_handler(_: i32) {
        unsafe {
            println!("[{}] Received signal and will umount.", libc::getpid());
        }
        umount!();
        unsafe {
            println!("[{}] All Done.", libc::getpid());
        }
        std::process::exit(0);
    }

    let sig_action = signal::SigAction::new(
        signal::SigHandler::Handler(signal_handler),
        signal::SaFlags::SA_NODEFER,
        signal::SigSet::empty(),
    );
    unsafe {
        match signal::sigaction(signal::SIGINT, &sig_action) {
            Ok(_) => {}
            Err(e) => {
                println!("SIGINT signal set failed, {:?}", e);
            }
        }
    }

    let read_only = matches.get_flag("read_only");
    let mut options = vec![MountOption::FSName("pfs".to_string())];
    options.push(if read_only { MountOption::RO } else { MountOption::RW });

    let retry_times = 3;
    match if matches.get_flag("front") { Ok(Fork::Child) } else { fork() } {
        Ok(Fork::Parent(child)) => {
            info!("Daemon running at pid: {}", child);
            Ok(())
        }
        Ok(Fork::Child) => {
            match retry_with_index(Fixed::from_millis(100), |current_try| {
                info!("[try {}/{}] Mount to {}", current_try, retry_times, abspath_mountpoint);
                let res = (|| -> Result<()> {
                    if (*FORCE_FORMAT.read()).unwrap_or(false) {
                        info!("--format given, discarding any existing image at {}", device);
                        let _ = fs::remove_file(device);
                    }
                    let config = Config::from_env();
                    let facade = Facade::<MmapBacking>::mount(device, config, data_capacity)?;
                    let fs = PfsFuse::new(facade);
                    fuser::mount2(fs, abspath_mountpoint, &options)?;
                    Ok(())
                })();
                match res {
                    Ok(()) => {
                        info!("All Done.");
                        OperationResult::Ok(())
                    }
                    Err(e) => {
                        if current_try > retry_times {
                            OperationResult::Err(format!("Failed to mount after {} retries! Err: {}", retry_times, e))
                        } else {
                            umount!();
                            info!("Umount Done.");
                            OperationResult::Retry("Failed to mount, trying to umount...".to_string())
                        }
                    }
                }
            }) {
                Ok(_) => Ok(()),
                Err(e) => Err(anyhow!("Mount failed with {}", e)),
            }
        }
        Err(e) => Err(anyhow!("Fork returns error {}", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storage::MemBacking;

    #[test]
    fn facade_mounts_on_fresh_backing() {
        let facade = Facade::<MemBacking>::mount("mem", Config::for_tests(), 4 * 1024 * 1024).unwrap();
        assert_eq!(facade.root(), facade.root());
    }
}
