//! Real-time scheduling for the control loop (Linux SCHED_FIFO / affinity / mlockall).

use crate::cli::RtLock;

/// Knobs collected from `hold --rt ...`.
#[derive(Copy, Clone, Debug)]
pub struct RtRequest {
    pub prio: Option<i32>,
    pub lock: RtLock,
    pub cpu: Option<usize>,
}

#[cfg(target_os = "linux")]
const MAX_CPUSET_BITS: usize = std::mem::size_of::<libc::cpu_set_t>() * 8;

/// Apply the request once per process. Every step is best effort: failures
/// are logged and the run continues without that guarantee.
#[cfg(target_os = "linux")]
pub fn setup_rt_once(req: RtRequest) {
    use std::sync::OnceLock;
    static RT_ONCE: OnceLock<()> = OnceLock::new();

    RT_ONCE.get_or_init(|| {
        match apply_mem_lock(req.lock) {
            Ok(()) => tracing::info!(lock = ?req.lock, "rt: memory lock applied"),
            Err(e) => tracing::warn!(error = %e, "rt: mlockall failed"),
        }
        match apply_fifo_priority(req.prio) {
            Ok(prio) => tracing::info!(prio, "rt: SCHED_FIFO applied"),
            Err(e) => tracing::warn!(error = %e, "rt: sched_setscheduler failed"),
        }
        match apply_affinity(req.cpu.unwrap_or(0)) {
            Ok(cpu) => tracing::info!(cpu, "rt: affinity applied"),
            Err(e) => tracing::warn!(error = %e, "rt: affinity not applied"),
        }
    });
}

#[cfg(not(target_os = "linux"))]
pub fn setup_rt_once(req: RtRequest) {
    tracing::warn!(?req, "rt: real-time mode is only supported on Linux; ignoring");
}

#[cfg(target_os = "linux")]
fn is_retryable_memlock_error(err: &std::io::Error) -> bool {
    matches!(err.raw_os_error(), Some(code) if code == libc::EPERM || code == libc::ENOMEM)
}

#[cfg(target_os = "linux")]
fn memlock_limit_hint() -> Option<String> {
    let mut rlim = std::mem::MaybeUninit::<libc::rlimit>::uninit();
    // SAFETY: getrlimit only writes into the provided struct.
    let rc = unsafe { libc::getrlimit(libc::RLIMIT_MEMLOCK, rlim.as_mut_ptr()) };
    if rc != 0 {
        return None;
    }
    // SAFETY: rc == 0 means the struct was initialized.
    let cur = unsafe { rlim.assume_init() }.rlim_cur;
    if cur == libc::RLIM_INFINITY {
        Some("memlock limit: unlimited".to_string())
    } else {
        Some(format!("memlock limit: {} KiB", cur / 1024))
    }
}

#[cfg(target_os = "linux")]
fn mlockall(flags: libc::c_int) -> std::io::Result<()> {
    // SAFETY: mlockall has no memory-safety preconditions.
    if unsafe { libc::mlockall(flags) } != 0 {
        Err(std::io::Error::last_os_error())
    } else {
        Ok(())
    }
}

#[cfg(target_os = "linux")]
fn apply_mem_lock(lock: RtLock) -> eyre::Result<()> {
    let result = match lock {
        RtLock::None => return Ok(()),
        RtLock::Current => mlockall(libc::MCL_CURRENT),
        RtLock::All => mlockall(libc::MCL_CURRENT | libc::MCL_FUTURE),
    };
    let Err(err) = result else {
        return Ok(());
    };

    // All may exceed the memlock limit where Current still fits.
    let mut fallback = None;
    if lock == RtLock::All && is_retryable_memlock_error(&err) {
        match mlockall(libc::MCL_CURRENT) {
            Ok(()) => {
                tracing::warn!(error = %err, "rt: mlockall(current|future) failed; locked current pages only");
                return Ok(());
            }
            Err(e2) => fallback = Some(e2),
        }
    }

    let mut msg = format!("mlockall({lock:?}) failed: {err}");
    if is_retryable_memlock_error(&err) {
        if let Some(h) = memlock_limit_hint() {
            msg.push_str(&format!("; {h}"));
        }
        msg.push_str("; hint: needs CAP_IPC_LOCK (or root) and sufficient 'ulimit -l'");
        if let Some(e2) = fallback {
            msg.push_str(&format!("; fallback mlockall(current) also failed: {e2}"));
        }
    }
    Err(eyre::eyre!(msg))
}

#[cfg(target_os = "linux")]
fn has_sys_nice() -> bool {
    const CAP_SYS_NICE: u64 = 1 << 23;
    let Ok(status) = std::fs::read_to_string("/proc/self/status") else {
        // Unknown; let sched_setscheduler decide.
        return true;
    };
    status.lines().any(|line| {
        (line.starts_with("CapEff:") || line.starts_with("CapPrm:"))
            && line
                .split_whitespace()
                .nth(1)
                .and_then(|hex| u64::from_str_radix(hex, 16).ok())
                .is_some_and(|caps| caps & CAP_SYS_NICE != 0)
    })
}

/// Returns the priority actually applied (clamped to the system range).
#[cfg(target_os = "linux")]
fn apply_fifo_priority(prio: Option<i32>) -> eyre::Result<i32> {
    // SAFETY: geteuid cannot fail.
    let euid = unsafe { libc::geteuid() };
    if euid != 0 && !has_sys_nice() {
        eyre::bail!(
            "insufficient privileges for SCHED_FIFO: needs CAP_SYS_NICE or root (euid {euid}); \
             hint: 'sudo setcap cap_sys_nice=ep /path/to/rangeloop'"
        );
    }
    // SAFETY: plain queries on a valid policy constant.
    let (min, max) = unsafe {
        (
            libc::sched_get_priority_min(libc::SCHED_FIFO),
            libc::sched_get_priority_max(libc::SCHED_FIFO),
        )
    };
    let (min, max) = if min < 0 || max < 0 { (1, 99) } else { (min, max) };
    let applied = prio.unwrap_or(max).clamp(min, max);
    let param = libc::sched_param {
        sched_priority: applied,
    };
    // SAFETY: param is a valid sched_param for the calling process.
    if unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) } != 0 {
        return Err(eyre::eyre!(std::io::Error::last_os_error()));
    }
    Ok(applied)
}

/// Pin the process to `cpu` if the current affinity mask allows it.
#[cfg(target_os = "linux")]
fn apply_affinity(cpu: usize) -> eyre::Result<usize> {
    // SAFETY: sysconf is a plain query.
    let online = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_ONLN) };
    if online < 1 {
        eyre::bail!("_SC_NPROCESSORS_ONLN < 1");
    }
    if cpu as libc::c_long >= online {
        eyre::bail!("requested CPU {cpu} >= online {online}");
    }
    if cpu >= MAX_CPUSET_BITS {
        eyre::bail!("requested CPU {cpu} exceeds cpu_set_t capacity {MAX_CPUSET_BITS}");
    }
    // SAFETY: cpu_set_t is plain data; the CPU_* helpers stay within its bounds
    // (cpu < MAX_CPUSET_BITS checked above).
    unsafe {
        let mut allowed: libc::cpu_set_t = std::mem::zeroed();
        if libc::sched_getaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &mut allowed) == 0
            && !libc::CPU_ISSET(cpu, &allowed)
        {
            eyre::bail!("CPU {cpu} not permitted by current affinity mask");
        }
        let mut desired: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_ZERO(&mut desired);
        libc::CPU_SET(cpu, &mut desired);
        if libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &desired) != 0 {
            return Err(eyre::eyre!(std::io::Error::last_os_error()));
        }
    }
    Ok(cpu)
}
