//! Thread placement for worker contexts
//!
//! Applies a [`WorkerContextConfig`] (CPU affinity, scheduling class and
//! priority) to the calling thread. Worker threads call
//! [`apply_worker_context`] first thing after they start, before loading their
//! engine.
//!
//! Only Linux is supported. On other platforms a non-default config is
//! reported as an error, which the worker logs and otherwise ignores.

use crate::config::WorkerContextConfig;
use crate::error::Result;

#[cfg(target_os = "linux")]
use crate::config::SchedulingPolicy;
#[cfg(target_os = "linux")]
use crate::error::PipelineError;

/// Apply `config` to the current thread
pub fn apply_worker_context(config: &WorkerContextConfig) -> Result<()> {
    if config.is_default() {
        return Ok(());
    }
    apply(config)
}

/// Number of logical CPUs visible to this process
pub fn available_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// CPU reserved for the `index`-th worker, counting down from the highest
/// CPU the calling thread may use
///
/// Wraps around when there are more workers than CPUs. None if the allowed
/// set cannot be determined.
pub fn reserved_cpu(index: usize) -> Option<usize> {
    #[cfg(target_os = "linux")]
    let allowed = current_affinity().ok()?;
    #[cfg(not(target_os = "linux"))]
    let allowed: Vec<usize> = (0..available_cpus()).collect();

    if allowed.is_empty() {
        return None;
    }
    Some(allowed[allowed.len() - 1 - index % allowed.len()])
}

/// Logical CPUs the calling thread is currently allowed to run on
#[cfg(target_os = "linux")]
pub fn current_affinity() -> Result<Vec<usize>> {
    // SAFETY: cpu_set_t is plain data filled in by the kernel.
    let (rc, set) = unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        let rc = libc::sched_getaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &mut set);
        (rc, set)
    };
    if rc != 0 {
        return Err(std::io::Error::last_os_error().into());
    }
    Ok((0..libc::CPU_SETSIZE as usize)
        // SAFETY: index is below CPU_SETSIZE
        .filter(|&cpu| unsafe { libc::CPU_ISSET(cpu, &set) })
        .collect())
}

#[cfg(target_os = "linux")]
fn apply(config: &WorkerContextConfig) -> Result<()> {
    if !config.cpu_affinity.is_empty() {
        set_affinity(&config.cpu_affinity)?;
    }
    if config.scheduling_policy.is_realtime() {
        set_scheduling(config.scheduling_policy, config.priority)?;
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn apply(config: &WorkerContextConfig) -> Result<()> {
    Err(crate::error::PipelineError::Config(format!(
        "thread placement {:?} is not supported on this platform",
        config
    )))
}

#[cfg(target_os = "linux")]
fn set_affinity(cpus: &[usize]) -> Result<()> {
    let max = libc::CPU_SETSIZE as usize;
    if let Some(&cpu) = cpus.iter().find(|&&cpu| cpu >= max) {
        return Err(PipelineError::Config(format!(
            "cpu {} is outside the affinity mask (max {})",
            cpu,
            max - 1
        )));
    }

    // SAFETY: cpu_set_t is plain data; every index is below CPU_SETSIZE.
    let rc = unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_ZERO(&mut set);
        for &cpu in cpus {
            libc::CPU_SET(cpu, &mut set);
        }
        // pid 0 = calling thread
        libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &set)
    };
    if rc != 0 {
        return Err(std::io::Error::last_os_error().into());
    }
    Ok(())
}

#[cfg(target_os = "linux")]
fn set_scheduling(policy: SchedulingPolicy, priority: i32) -> Result<()> {
    let policy = match policy {
        SchedulingPolicy::Normal => return Ok(()),
        SchedulingPolicy::Fifo => libc::SCHED_FIFO,
        SchedulingPolicy::RoundRobin => libc::SCHED_RR,
    };

    // SAFETY: plain libc calls on the current thread with a zero-initialized sched_param.
    let rc = unsafe {
        let min = libc::sched_get_priority_min(policy);
        let max = libc::sched_get_priority_max(policy);
        let mut param: libc::sched_param = std::mem::zeroed();
        param.sched_priority = priority.clamp(min, max);
        libc::pthread_setschedparam(libc::pthread_self(), policy, &param)
    };
    if rc != 0 {
        // pthread functions return the error code instead of setting errno
        return Err(std::io::Error::from_raw_os_error(rc).into());
    }
    Ok(())
}
