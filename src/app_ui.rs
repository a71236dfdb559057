use eframe::egui;
use std::path::PathBuf;

use crate::app::{NoticeKind, Phase, VisionApp};
use crate::image_select::Preview;
use crate::ollama::InferenceApi;

impl<A: InferenceApi> eframe::App for VisionApp<A> {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.poll_background();
        self.handle_dropped_files(ctx);

        if let Some(text) = self.take_clipboard() {
            ctx.output_mut(|o| o.copied_text = text);
        }

        let title = self.title();
        if title != self.shown_title {
            ctx.send_viewport_cmd(egui::ViewportCommand::Title(title.clone()));
            self.shown_title = title;
        }

        if self.preview_dirty {
            self.upload_preview(ctx);
        }

        if self.notice.is_some() {
            self.show_notice(ctx);
        }

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.add_enabled_ui(self.notice.is_none(), |ui| {
                egui::ScrollArea::vertical()
                    .auto_shrink([false; 2])
                    .show(ui, |ui| self.render_main(ui, ctx));
            });
        });
    }
}

impl<A: InferenceApi> VisionApp<A> {
    fn handle_dropped_files(&mut self, ctx: &egui::Context) {
        let dropped: Vec<Option<PathBuf>> =
            ctx.input(|i| i.raw.dropped_files.iter().map(|f| f.path.clone()).collect());
        if !dropped.is_empty() {
            self.drop_files(dropped);
        }
    }

    fn upload_preview(&mut self, ctx: &egui::Context) {
        self.preview_dirty = false;
        self.preview_texture = match self.image.as_ref().map(|i| &i.preview) {
            Some(Preview::Ready(thumb)) => {
                let pixels = egui::ColorImage::from_rgba_unmultiplied(
                    [thumb.width as usize, thumb.height as usize],
                    &thumb.rgba,
                );
                Some(ctx.load_texture("image_preview", pixels, egui::TextureOptions::LINEAR))
            }
            _ => None,
        };
    }

    fn show_notice(&mut self, ctx: &egui::Context) {
        let Some(notice) = &self.notice else {
            return;
        };

        let mut dismissed = false;
        egui::Window::new(notice.title.as_str())
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
            .show(ctx, |ui| {
                let color = match notice.kind {
                    NoticeKind::Error => egui::Color32::RED,
                    NoticeKind::Warning => egui::Color32::YELLOW,
                };
                ui.horizontal(|ui| {
                    ui.label(egui::RichText::new("⚠").size(24.0).color(color));
                    ui.label(notice.message.as_str());
                });
                ui.add_space(8.0);
                ui.vertical_centered(|ui| {
                    if ui.button("OK").clicked() {
                        dismissed = true;
                    }
                });
            });

        if dismissed || ctx.input(|i| i.key_pressed(egui::Key::Enter) || i.key_pressed(egui::Key::Escape)) {
            self.dismiss_notice();
        }
    }

    fn render_main(&mut self, ui: &mut egui::Ui, ctx: &egui::Context) {
        let busy = self.phase() == Phase::Busy;

        ui.vertical_centered(|ui| {
            ui.heading("🖼 Ollama Vision Model Analyzer");
        });
        ui.add_space(12.0);

        egui::Grid::new("inputs_grid")
            .num_columns(2)
            .spacing([8.0, 8.0])
            .show(ui, |ui| {
                ui.label("Model:");
                ui.horizontal(|ui| {
                    let mut new_model = self.selected_model.clone();
                    egui::ComboBox::from_id_source("model_select")
                        .selected_text(&new_model)
                        .width(260.0)
                        .show_ui(ui, |ui| {
                            for model in self.catalog.models() {
                                ui.selectable_value(&mut new_model, model.name.clone(), &model.name);
                            }
                        });
                    if new_model != self.selected_model {
                        self.select_model(&new_model);
                    }

                    let refresh = ui
                        .add_enabled(!self.is_connecting(), egui::Button::new("🔄"))
                        .on_hover_text("Refresh connection and model list");
                    if refresh.clicked() {
                        self.refresh_connection();
                    }
                    if self.is_connecting() {
                        ui.spinner();
                    }
                });
                ui.end_row();

                ui.label("Image:");
                ui.horizontal(|ui| {
                    match &self.image {
                        Some(image) => ui.label(image.display_name()),
                        None => ui.label(
                            egui::RichText::new("No image selected").color(egui::Color32::GRAY),
                        ),
                    };
                    if ui.add_enabled(!busy, egui::Button::new("Browse...")).clicked() {
                        self.browse_image();
                    }
                });
                ui.end_row();
            });

        if let Some(endpoint) = self.connected_endpoint() {
            ui.label(
                egui::RichText::new(format!("Server: {} ({})", endpoint.base_url(), endpoint.label))
                    .small()
                    .color(egui::Color32::GRAY),
            );
        }

        ui.add_space(8.0);
        self.render_preview(ui, ctx);
        ui.add_space(8.0);

        ui.label("Prompt:");
        ui.add_sized(
            [ui.available_width(), 70.0],
            egui::TextEdit::multiline(&mut self.prompt).desired_rows(4),
        );

        ui.add_space(12.0);
        ui.vertical_centered(|ui| {
            ui.horizontal(|ui| {
                let label = if busy { "🔍 Analyzing..." } else { "🔍 Analyze Image" };
                if ui.add_enabled(!busy, egui::Button::new(label)).clicked() {
                    self.analyze();
                }
                if busy && ui.button("Cancel").clicked() {
                    self.cancel_analysis();
                }
            });
        });

        if busy {
            ui.add(egui::ProgressBar::new(0.0).animate(true));
        }

        ui.add_space(8.0);
        ui.group(|ui| {
            ui.label(egui::RichText::new("Model Response").strong());
            egui::ScrollArea::vertical()
                .id_source("response_scroll")
                .max_height(220.0)
                .show(ui, |ui| {
                    ui.add_sized(
                        [ui.available_width(), 200.0],
                        egui::TextEdit::multiline(&mut self.response.as_str()).desired_rows(10),
                    );
                });
            ui.add_space(8.0);
            ui.vertical_centered(|ui| {
                if ui.button("📋 Copy Response").clicked() {
                    self.copy_response();
                }
            });
        });
    }

    fn render_preview(&mut self, ui: &mut egui::Ui, ctx: &egui::Context) {
        let hovering = self.config.drag_and_drop && ctx.input(|i| !i.raw.hovered_files.is_empty());
        let title = if self.config.drag_and_drop {
            "Image Preview (drag & drop here)"
        } else {
            "Image Preview"
        };

        let stroke = if hovering {
            egui::Stroke::new(2.0, ui.visuals().selection.stroke.color)
        } else {
            ui.visuals().widgets.noninteractive.bg_stroke
        };

        egui::Frame::group(ui.style()).stroke(stroke).show(ui, |ui| {
            ui.set_width(ui.available_width());
            ui.label(egui::RichText::new(title).small());
            ui.vertical_centered(|ui| match (&self.preview_texture, self.image.as_ref().map(|i| &i.preview)) {
                (Some(texture), _) => {
                    let image = egui::Image::from_texture(texture).fit_to_exact_size(texture.size_vec2());
                    ui.add(image);
                }
                (None, Some(Preview::Failed(error))) => {
                    ui.colored_label(egui::Color32::RED, error.as_str());
                }
                _ => {
                    let hint = if self.config.drag_and_drop {
                        "No image selected\nDrag & drop an image here or use Browse..."
                    } else {
                        "No image selected\nUse Browse... to select an image"
                    };
                    ui.label(egui::RichText::new(hint).color(egui::Color32::GRAY));
                }
            });
        });
    }
}
