// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Low-level handoff to the application and the resident loader trigger.

use rollboot_common::protocol::{RAM_UPDATE_FLAG_ADDR, RAM_UPDATE_MAGIC};

/// Check if the resident loader is requested via GP2 pin (LOW) or RAM magic flag.
/// The flag is consumed so the next reset boots normally.
pub fn check_update_trigger(gp2_is_low: bool) -> bool {
    let ram_flag = unsafe { (RAM_UPDATE_FLAG_ADDR as *const u32).read_volatile() };
    unsafe {
        (RAM_UPDATE_FLAG_ADDR as *mut u32).write_volatile(0);
    }
    gp2_is_low || ram_flag == RAM_UPDATE_MAGIC
}

/// Put the peripherals the bootloader touched back into reset so the
/// application's HAL finds them the way it would after power-on.
pub unsafe fn reset_peripherals() {
    const RESETS_RESET: *mut u32 = 0x4000_C000 as *mut u32;
    const UART0_RESET_BIT: u32 = 1 << 22;
    const USBCTRL_RESET_BIT: u32 = 1 << 24;

    let reset = RESETS_RESET.read_volatile();
    RESETS_RESET.write_volatile(reset | UART0_RESET_BIT | USBCTRL_RESET_BIT);
}

/// Reset clocks to power-on reset state:
/// - clk_sys runs from clk_ref
/// - clk_ref runs from ROSC
/// - XOSC disabled
/// - PLLs in reset
/// - Watchdog tick disabled
pub unsafe fn reset_clocks_to_power_on_state() {
    const CLOCKS_BASE: u32 = 0x4000_8000;
    const CLK_REF_CTRL: *mut u32 = (CLOCKS_BASE + 0x30) as *mut u32;
    const CLK_REF_SELECTED: *const u32 = (CLOCKS_BASE + 0x38) as *const u32;
    const CLK_SYS_CTRL: *mut u32 = (CLOCKS_BASE + 0x3C) as *mut u32;
    const CLK_SYS_SELECTED: *const u32 = (CLOCKS_BASE + 0x44) as *const u32;

    const XOSC_CTRL: *mut u32 = 0x4002_4000 as *mut u32;
    const RESETS_RESET: *mut u32 = 0x4000_C000 as *mut u32;
    const WATCHDOG_TICK: *mut u32 = (0x4005_8000 + 0x2C) as *mut u32;

    const PLL_SYS_RESET_BIT: u32 = 1 << 12;
    const PLL_USB_RESET_BIT: u32 = 1 << 13;

    // clk_sys <- clk_ref
    let ctrl = CLK_SYS_CTRL.read_volatile();
    CLK_SYS_CTRL.write_volatile(ctrl & !0x1);
    while CLK_SYS_SELECTED.read_volatile() != 0x1 {
        core::hint::spin_loop();
    }

    // clk_ref <- ROSC
    let ctrl = CLK_REF_CTRL.read_volatile();
    CLK_REF_CTRL.write_volatile(ctrl & !0x3);
    while CLK_REF_SELECTED.read_volatile() != 0x1 {
        core::hint::spin_loop();
    }

    const XOSC_CTRL_DISABLE: u32 = 0xD1E << 12;
    let ctrl = XOSC_CTRL.read_volatile();
    XOSC_CTRL.write_volatile((ctrl & !0x00FF_F000) | XOSC_CTRL_DISABLE);

    let reset = RESETS_RESET.read_volatile();
    RESETS_RESET.write_volatile(reset | PLL_SYS_RESET_BIT | PLL_USB_RESET_BIT);

    WATCHDOG_TICK.write_volatile(0);

    cortex_m::asm::dsb();
    cortex_m::asm::isb();
}

/// Stop SysTick, then mask, clear and disable every NVIC interrupt.
pub unsafe fn disable_interrupts() {
    cortex_m::interrupt::disable();

    const SYST_CSR: *mut u32 = 0xE000_E010 as *mut u32;
    SYST_CSR.write_volatile(0);

    const NVIC_ICER: *mut u32 = 0xE000_E180 as *mut u32;
    NVIC_ICER.write_volatile(0xFFFF_FFFF);

    const NVIC_ICPR: *mut u32 = 0xE000_E280 as *mut u32;
    NVIC_ICPR.write_volatile(0xFFFF_FFFF);
}

pub unsafe fn relocate_vector_table(base: u32) {
    const SCB_VTOR: *mut u32 = 0xE000_ED08 as *mut u32;
    SCB_VTOR.write_volatile(base);

    cortex_m::asm::dsb();
    cortex_m::asm::isb();
}

pub unsafe fn jump_to_application(initial_sp: u32, reset_vector: u32) -> ! {
    core::arch::asm!(
        "msr msp, {sp}",
        "cpsie i",  // cortex-m-rt and the SDK both expect PRIMASK=0 at reset
        "bx {reset}",
        sp = in(reg) initial_sp,
        reset = in(reg) reset_vector,
        options(noreturn)
    );
}
